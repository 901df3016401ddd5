//! Test doubles shared by notifier tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::channels::NotifierDeps;
use super::dispatch::{DispatchGateway, DispatchRequest, WebhookSender};
use super::template::TemplateRenderer;
use crate::error::DispatchError;
use crate::models::{AlertGroup, AlertRecord, ChannelConfig, LabelSet};

/// Sender that records every request instead of sending it
#[derive(Default)]
pub struct RecordingSender {
    requests: Mutex<Vec<DispatchRequest>>,
    failure: Option<DispatchError>,
    delay: Option<Duration>,
}

impl RecordingSender {
    /// Fail every send with `error` (after recording the request)
    pub fn failing(error: DispatchError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests seen so far
    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The only request seen so far
    pub fn single(&self) -> DispatchRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests.into_iter().next().unwrap()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send(&self, request: DispatchRequest) -> Result<(), DispatchError> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Notifier dependencies over a recording sender and `http://localhost`
pub fn deps(sender: Arc<RecordingSender>) -> NotifierDeps {
    NotifierDeps {
        renderer: Arc::new(TemplateRenderer::new("http://localhost").unwrap()),
        gateway: DispatchGateway::new(sender),
    }
}

/// Channel config of `kind` with the given settings
pub fn channel(kind: &str, settings: serde_json::Value) -> ChannelConfig {
    ChannelConfig {
        uid: format!("{kind}-uid"),
        name: format!("{kind}_testing"),
        kind: kind.to_string(),
        settings,
        ..Default::default()
    }
}

/// Firing alert with the given labels and annotations
pub fn firing_alert(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> AlertRecord {
    AlertRecord {
        labels: labels.iter().copied().collect(),
        annotations: annotations.iter().copied().collect(),
        ..Default::default()
    }
}

/// Same as [`firing_alert`] but ended a minute ago
pub fn resolved_alert(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> AlertRecord {
    AlertRecord {
        ends_at: Some(Utc::now() - chrono::Duration::minutes(1)),
        ..firing_alert(labels, annotations)
    }
}

/// Group keyed on `alertname` with an empty group label value
pub fn group(alerts: Vec<AlertRecord>) -> AlertGroup {
    AlertGroup::new(
        "alertname",
        [("alertname", "")].into_iter().collect::<LabelSet>(),
        alerts,
    )
}

/// One firing alert: `alertname=alert1, lbl1=val1`, `ann1=annv1`
pub fn single_firing() -> AlertGroup {
    group(vec![firing_alert(
        &[("alertname", "alert1"), ("lbl1", "val1")],
        &[("ann1", "annv1")],
    )])
}

/// One resolved alert: `alertname=alert1, lbl1=val1`, `ann1=annv1`
pub fn single_resolved() -> AlertGroup {
    group(vec![resolved_alert(
        &[("alertname", "alert1"), ("lbl1", "val1")],
        &[("ann1", "annv1")],
    )])
}

/// Body of a JSON request
pub fn json_body(request: &DispatchRequest) -> serde_json::Value {
    serde_json::from_slice(&request.body).unwrap()
}
