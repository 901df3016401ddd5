//! Sensu Go events API

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{finish_render, require, secret, Notifier, NotifierBase, NotifierDeps};
use crate::alerting::dispatch::{path_escape, DispatchRequest};
use crate::alerting::secrets::{Decrypter, Secret};
use crate::alerting::template::DEFAULT_MESSAGE_INLINE;
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, AlertStatus, Settings};

const DEFAULT_NAME: &str = "default";
const CHECK_INTERVAL_SECS: u32 = 86400;

/// Sensu check status codes
const STATUS_OK: u8 = 0;
const STATUS_CRITICAL: u8 = 2;

/// Publishes check results as Sensu Go events
#[derive(Debug)]
pub struct SensuGoNotifier {
    base: NotifierBase,
    url: String,
    api_key: Secret,
    entity: String,
    check: String,
    namespace: String,
    handler: String,
    message: String,
    deps: NotifierDeps,
}

impl SensuGoNotifier {
    /// Validate settings in order: `url`, `apikey` (secret)
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        decrypter: &dyn Decrypter,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let url = settings.str("url");
        require(url, "Could not find URL property in settings")?;

        let api_key = secret(settings, decrypter, "apikey");
        require(api_key.expose(), "Could not find the API key property in settings")?;

        Ok(Self {
            base,
            url: url.trim_end_matches('/').to_string(),
            api_key,
            entity: settings.str_or("entity", DEFAULT_NAME).to_string(),
            check: settings.str_or("check", DEFAULT_NAME).to_string(),
            namespace: settings.str_or("namespace", DEFAULT_NAME).to_string(),
            handler: settings.str("handler").trim().to_string(),
            message: settings.str_or("message", DEFAULT_MESSAGE_INLINE).to_string(),
            deps,
        })
    }

    fn events_url(&self) -> String {
        format!(
            "{}/api/core/v2/namespaces/{}/events",
            self.url,
            path_escape(&self.namespace)
        )
    }
}

#[derive(Debug, Serialize)]
struct Event<'a> {
    entity: Entity<'a>,
    check: Check<'a>,
    #[serde(rename = "ruleUrl")]
    rule_url: String,
}

#[derive(Debug, Serialize)]
struct Entity<'a> {
    metadata: Metadata<'a>,
}

#[derive(Debug, Serialize)]
struct Metadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
struct Check<'a> {
    metadata: Metadata<'a>,
    output: String,
    issued: i64,
    interval: u32,
    status: u8,
    handlers: Vec<&'a str>,
}

#[async_trait]
impl Notifier for SensuGoNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let status = match data.status {
            AlertStatus::Firing => STATUS_CRITICAL,
            AlertStatus::Resolved => STATUS_OK,
        };
        debug!(status, entity = %self.entity, check = %self.check, "Sending Sensu Go event");

        let mut tmpl = renderer.session(&data);
        let output = tmpl.text(&self.message);
        finish_render(&self.base, tmpl)?;

        let rule_url = renderer.rule_url();
        let handlers = if self.handler.is_empty() {
            Vec::new()
        } else {
            vec![self.handler.as_str()]
        };
        let event = Event {
            entity: Entity {
                metadata: Metadata {
                    name: &self.entity,
                    namespace: Some(&self.namespace),
                    labels: BTreeMap::new(),
                },
            },
            check: Check {
                metadata: Metadata {
                    name: &self.check,
                    namespace: None,
                    labels: BTreeMap::from([("ruleURL", rule_url.clone())]),
                },
                output,
                issued: Utc::now().timestamp(),
                interval: CHECK_INTERVAL_SECS,
                status,
                handlers,
            },
            rule_url,
        };

        let request = DispatchRequest::post(self.events_url())
            .header("Authorization", format!("Key {}", self.api_key.expose()))
            .json(&event)?;
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

    fn build(settings: serde_json::Value, sender: Arc<RecordingSender>) -> ChannelNotifier {
        ChannelNotifier::new(&channel("sensugo", settings), &PlainSettings, &deps(sender)).unwrap()
    }

    #[tokio::test]
    async fn test_firing_event() {
        let sender = Arc::new(RecordingSender::default());
        build(
            json!({
                "url": "http://sensu-api.local:8080/",
                "apikey": "secret",
                "entity": "alertrelay",
                "check": "alerts",
                "namespace": "ops",
                "handler": "email",
                "message": "{{len firing}} firing"
            }),
            sender.clone(),
        )
        .notify(&CancellationToken::new(), &single_firing())
        .await
        .unwrap();

        let request = sender.single();
        assert_eq!(
            request.url,
            "http://sensu-api.local:8080/api/core/v2/namespaces/ops/events"
        );
        assert_eq!(request.headers["Authorization"], "Key secret");

        let mut body = json_body(&request);
        assert!(body["check"]["issued"].is_i64());
        body["check"]["issued"] = json!(0);
        assert_eq!(
            body,
            json!({
                "entity": {"metadata": {"name": "alertrelay", "namespace": "ops"}},
                "check": {
                    "metadata": {
                        "name": "alerts",
                        "labels": {"ruleURL": "http://localhost/alerting/list"}
                    },
                    "output": "1 firing",
                    "issued": 0,
                    "interval": 86400,
                    "status": 2,
                    "handlers": ["email"]
                },
                "ruleUrl": "http://localhost/alerting/list"
            })
        );
    }

    #[tokio::test]
    async fn test_resolved_defaults() {
        let sender = Arc::new(RecordingSender::default());
        build(json!({"url": "http://sensu", "apikey": "k"}), sender.clone())
            .notify(&CancellationToken::new(), &single_resolved())
            .await
            .unwrap();

        let request = sender.single();
        assert_eq!(request.url, "http://sensu/api/core/v2/namespaces/default/events");
        let body = json_body(&request);
        assert_eq!(body["check"]["status"], 0);
        assert_eq!(body["entity"]["metadata"]["name"], "default");
        assert_eq!(body["check"]["handlers"], json!([]));
    }

    #[test]
    fn test_api_key_required() {
        let err = ChannelNotifier::new(
            &channel("sensugo", json!({"url": "http://sensu"})),
            &PlainSettings,
            &deps(Arc::new(RecordingSender::default())),
        )
        .unwrap_err();
        assert_eq!(err.reason, "Could not find the API key property in settings");
    }
}
