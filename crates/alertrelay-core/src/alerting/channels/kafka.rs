//! Kafka REST Proxy

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::pagerduty::dedup_key;
use super::{finish_render, require, Notifier, NotifierBase, NotifierDeps};
use crate::alerting::dispatch::{path_escape, DispatchRequest};
use crate::alerting::template::{DEFAULT_MESSAGE, DEFAULT_TITLE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, AlertStatus, Settings};

/// Content type of record batches accepted by the REST proxy
pub const KAFKA_JSON_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

const KAFKA_ACCEPT: &str = "application/vnd.kafka.v2+json";
const CLIENT_NAME: &str = "AlertRelay";

/// Produces one record per notification to a topic through the REST proxy
#[derive(Debug)]
pub struct KafkaNotifier {
    base: NotifierBase,
    endpoint: String,
    topic: String,
    deps: NotifierDeps,
}

impl KafkaNotifier {
    /// Validate settings in order: `kafkaRestProxy`, `kafkaTopic`
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let endpoint = settings.str("kafkaRestProxy");
        require(endpoint, "Could not find kafka rest proxy endpoint property in settings")?;
        let topic = settings.str("kafkaTopic");
        require(topic, "Could not find kafka topic property in settings")?;

        Ok(Self {
            base,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            topic: topic.to_string(),
            deps,
        })
    }

    fn topic_url(&self) -> String {
        format!("{}/topics/{}", self.endpoint, path_escape(&self.topic))
    }
}

#[derive(Debug, Serialize)]
struct RecordBatch {
    records: Vec<Record>,
}

#[derive(Debug, Serialize)]
struct Record {
    value: RecordValue,
}

#[derive(Debug, Serialize)]
struct RecordValue {
    alert_state: &'static str,
    client: &'static str,
    client_url: String,
    description: String,
    details: String,
    incident_key: String,
}

#[async_trait]
impl Notifier for KafkaNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name, topic = %self.topic))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let alert_state = match data.status {
            AlertStatus::Firing => "alerting",
            AlertStatus::Resolved => "ok",
        };
        debug!(alert_state, "Producing Kafka record");

        let mut tmpl = renderer.session(&data);
        let description = tmpl.named(DEFAULT_TITLE);
        let details = tmpl.named(DEFAULT_MESSAGE);
        finish_render(&self.base, tmpl)?;

        let batch = RecordBatch {
            records: vec![Record {
                value: RecordValue {
                    alert_state,
                    client: CLIENT_NAME,
                    client_url: renderer.rule_url(),
                    description,
                    details,
                    incident_key: dedup_key(&group.key),
                },
            }],
        };

        // json() sets application/json; the proxy wants its own media type
        let request = DispatchRequest::post(self.topic_url())
            .json(&batch)?
            .header("Content-Type", KAFKA_JSON_CONTENT_TYPE)
            .header("Accept", KAFKA_ACCEPT);
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
        channel, deps, json_body, single_firing, single_resolved, RecordingSender,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn build(sender: Arc<RecordingSender>) -> ChannelNotifier {
        ChannelNotifier::new(
            &channel(
                "kafka",
                json!({"kafkaRestProxy": "http://localhost:8082/", "kafkaTopic": "alerts"}),
            ),
            &PlainSettings,
            &deps(sender),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_firing_record() {
        let sender = Arc::new(RecordingSender::default());
        build(sender.clone())
            .notify(&CancellationToken::new(), &single_firing())
            .await
            .unwrap();

        let request = sender.single();
        assert_eq!(request.url, "http://localhost:8082/topics/alerts");
        assert_eq!(request.headers["Content-Type"], KAFKA_JSON_CONTENT_TYPE);
        assert_eq!(request.headers["Accept"], KAFKA_ACCEPT);
        assert_eq!(
            json_body(&request),
            json!({
                "records": [{
                    "value": {
                        "alert_state": "alerting",
                        "client": "AlertRelay",
                        "client_url": "http://localhost/alerting/list",
                        "description": "[FIRING:1]  (val1)",
                        "details": "\n**Firing**\nLabels:\n - alertname = alert1\n - lbl1 = val1\nAnnotations:\n - ann1 = annv1\nSource: \n\n\n\n\n",
                        "incident_key": "6e3538104c14b583da237e9693b76debbc17f0f8058ef20492e5853096cf8733"
                    }
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_resolved_state_is_ok() {
        let sender = Arc::new(RecordingSender::default());
        build(sender.clone())
            .notify(&CancellationToken::new(), &single_resolved())
            .await
            .unwrap();

        assert_eq!(json_body(&sender.single())["records"][0]["value"]["alert_state"], "ok");
    }

    #[test]
    fn test_topic_required() {
        let err = ChannelNotifier::new(
            &channel("kafka", json!({"kafkaRestProxy": "http://localhost:8082"})),
            &PlainSettings,
            &deps(Arc::new(RecordingSender::default())),
        )
        .unwrap_err();
        assert_eq!(err.reason, "Could not find kafka topic property in settings");
    }
}
