//! VictorOps (Splunk On-Call) REST endpoint

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::pagerduty::dedup_key;
use super::{finish_render, require, Notifier, NotifierBase, NotifierDeps, FOOTER_TEXT};
use crate::alerting::classifier;
use crate::alerting::dispatch::DispatchRequest;
use crate::alerting::template::{DEFAULT_MESSAGE, DEFAULT_TITLE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, AlertStatus, Settings};

/// Message type sent for resolved groups
pub const RECOVERY: &str = "RECOVERY";

/// Posts incidents to a VictorOps REST integration
#[derive(Debug)]
pub struct VictorOpsNotifier {
    base: NotifierBase,
    url: String,
    message_type: String,
    deps: NotifierDeps,
}

impl VictorOpsNotifier {
    /// Validate settings: `url`
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let url = settings.str("url");
        require(url, "Could not find victorops url property in settings")?;

        Ok(Self {
            base,
            url: url.to_string(),
            message_type: settings.str_or("messageType", "CRITICAL").to_uppercase(),
            deps,
        })
    }
}

#[derive(Debug, Serialize)]
struct VictorOpsMessage<'a> {
    message_type: &'a str,
    entity_id: String,
    entity_display_name: String,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_start_time: Option<i64>,
    state_message: String,
    monitoring_tool: &'static str,
    alert_url: String,
}

#[async_trait]
impl Notifier for VictorOpsNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        let now = Utc::now();
        let classification = classifier::classify_at(&group.alerts, now);
        let message_type = match classification.status {
            AlertStatus::Firing => self.message_type.as_str(),
            AlertStatus::Resolved => RECOVERY,
        };
        debug!(message_type, firing = classification.firing, "Sending VictorOps notification");

        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let mut tmpl = renderer.session(&data);
        let title = tmpl.named(DEFAULT_TITLE);
        let message = tmpl.named(DEFAULT_MESSAGE);
        finish_render(&self.base, tmpl)?;

        let payload = VictorOpsMessage {
            message_type,
            entity_id: dedup_key(&group.key),
            entity_display_name: title,
            timestamp: now.timestamp(),
            state_start_time: classification.earliest_start.map(|t| t.timestamp()),
            state_message: message,
            monitoring_tool: FOOTER_TEXT,
            alert_url: renderer.rule_url(),
        };

        let request = DispatchRequest::post(&self.url).json(&payload)?;
        self.deps.send(&self.base, cancel, request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alerting::channels::ChannelNotifier;
    use crate::alerting::secrets::PlainSettings;
    use crate::alerting::testing::{
        channel, deps, firing_alert, group, json_body, single_resolved, RecordingSender,
    };
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn build(sender: Arc<RecordingSender>) -> ChannelNotifier {
        ChannelNotifier::new(
            &channel("victorops", json!({"url": "http://localhost/vo", "messageType": "warning"})),
            &PlainSettings,
            &deps(sender),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_firing_uses_earliest_start() {
        let sender = Arc::new(RecordingSender::default());
        let earliest = Utc::now() - Duration::minutes(30);
        let mut first = firing_alert(&[("alertname", "a"), ("x", "1")], &[]);
        first.starts_at = Some(Utc::now() - Duration::minutes(5));
        let mut second = firing_alert(&[("alertname", "a"), ("x", "2")], &[]);
        second.starts_at = Some(earliest);

        build(sender.clone())
            .notify(&CancellationToken::new(), &group(vec![first, second]))
            .await
            .unwrap();

        let body = json_body(&sender.single());
        assert_eq!(body["message_type"], "WARNING");
        assert_eq!(body["state_start_time"], json!(earliest.timestamp()));
        assert_eq!(body["entity_display_name"], "[FIRING:2]  ");
        assert_eq!(body["alert_url"], "http://localhost/alerting/list");
        assert_eq!(body["entity_id"], dedup_key("alertname"));
    }

    #[tokio::test]
    async fn test_resolved_is_recovery() {
        let sender = Arc::new(RecordingSender::default());
        build(sender.clone())
            .notify(&CancellationToken::new(), &single_resolved())
            .await
            .unwrap();

        let body = json_body(&sender.single());
        assert_eq!(body["message_type"], RECOVERY);
        assert!(body.get("state_start_time").is_none());
    }
}
