//! Generic JSON webhook
//!
//! The payload extends the alertmanager webhook format with rendered
//! `title`, `message` and a legacy `state` (`alerting`/`ok`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{finish_render, require, secret, Notifier, NotifierBase, NotifierDeps};
use crate::alerting::dispatch::{DispatchRequest, HttpMethod};
use crate::alerting::secrets::{Decrypter, Secret};
use crate::alerting::template::{DEFAULT_MESSAGE, DEFAULT_TITLE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, AlertStatus, LabelSet, Settings};

/// Sends alert groups as JSON to an arbitrary endpoint
#[derive(Debug)]
pub struct WebhookNotifier {
    base: NotifierBase,
    url: String,
    method: HttpMethod,
    user: String,
    password: Secret,
    max_alerts: usize,
    deps: NotifierDeps,
}

impl WebhookNotifier {
    /// Validate settings: `url`, `httpMethod`, `username`, `password` (secret), `maxAlerts`
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        decrypter: &dyn Decrypter,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let url = settings.str("url");
        require(url, "Could not find url property in settings")?;

        let method = match settings.str_or("httpMethod", "POST").to_uppercase().as_str() {
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            other => {
                return Err(ValidationError::new(format!(
                    "Invalid HTTP method {other:?}: must be POST or PUT"
                )))
            }
        };

        Ok(Self {
            base,
            url: url.to_string(),
            method,
            user: settings.str("username").to_string(),
            password: secret(settings, decrypter, "password"),
            max_alerts: settings
                .int("maxAlerts")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0),
            deps,
        })
    }

    /// Keep at most `max_alerts` alerts (0 means unlimited); returns the number dropped
    fn truncate(&self, group: &AlertGroup) -> (AlertGroup, usize) {
        if self.max_alerts == 0 || group.alerts.len() <= self.max_alerts {
            return (group.clone(), 0);
        }
        let truncated = AlertGroup::new(
            group.key.clone(),
            group.group_labels.clone(),
            group.alerts[..self.max_alerts].to_vec(),
        );
        (truncated, group.alerts.len() - self.max_alerts)
    }
}

/// One alert in alertmanager webhook shape
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookAlert<'a> {
    status: AlertStatus,
    labels: &'a LabelSet,
    annotations: &'a LabelSet,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL")]
    generator_url: &'a str,
    fingerprint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookMessage<'a> {
    receiver: &'a str,
    status: AlertStatus,
    alerts: Vec<WebhookAlert<'a>>,
    group_labels: &'a LabelSet,
    common_labels: LabelSet,
    common_annotations: LabelSet,
    #[serde(rename = "externalURL")]
    external_url: String,
    version: &'static str,
    group_key: &'a str,
    truncated_alerts: usize,
    title: String,
    state: &'static str,
    message: String,
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name, method = %self.method))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        let (group, truncated_alerts) = self.truncate(group);
        debug!(alerts = group.alerts.len(), truncated_alerts, "Sending webhook notification");

        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, &group);
        let mut tmpl = renderer.session(&data);
        let title = tmpl.named(DEFAULT_TITLE);
        let message = tmpl.named(DEFAULT_MESSAGE);
        finish_render(&self.base, tmpl)?;

        let payload = WebhookMessage {
            receiver: &self.base.name,
            status: data.status,
            alerts: group
                .alerts
                .iter()
                .map(|alert| WebhookAlert {
                    status: alert.status(),
                    labels: &alert.labels,
                    annotations: &alert.annotations,
                    starts_at: alert.starts_at,
                    ends_at: alert.ends_at,
                    generator_url: alert.generator_url.as_deref().unwrap_or_default(),
                    fingerprint: alert.fingerprint(),
                })
                .collect(),
            group_labels: &group.group_labels,
            common_labels: group.common_labels(),
            common_annotations: group.common_annotations(),
            external_url: renderer.external_url().to_string(),
            version: "1",
            group_key: &group.key,
            truncated_alerts,
            title,
            state: match data.status {
                AlertStatus::Firing => "alerting",
                AlertStatus::Resolved => "ok",
            },
            message,
        };

        let mut request = DispatchRequest::post(&self.url)
            .method(self.method)
            .json(&payload)?;
        if !self.user.is_empty() && !self.password.is_empty() {
            request = request.basic_auth(&self.user, self.password.expose());
        }

        self.deps.send(&self.base, cancel, request).await
    }
}
