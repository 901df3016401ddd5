//! LINE Notify

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{finish_render, require, secret, Notifier, NotifierBase, NotifierDeps};
use crate::alerting::dispatch::{DispatchRequest, FormBody};
use crate::alerting::secrets::{Decrypter, Secret};
use crate::alerting::template::{DEFAULT_MESSAGE, DEFAULT_TITLE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, Settings};

/// LINE Notify endpoint
pub const LINE_NOTIFY_URL: &str = "https://notify-api.line.me/api/notify";

/// Sends notifications through the LINE Notify API
#[derive(Debug)]
pub struct LineNotifier {
    base: NotifierBase,
    token: Secret,
    deps: NotifierDeps,
}

impl LineNotifier {
    /// Validate settings: `token` (secret)
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        decrypter: &dyn Decrypter,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let token = secret(settings, decrypter, "token");
        require(token.expose(), "Could not find token in settings")?;

        Ok(Self { base, token, deps })
    }
}

#[async_trait]
impl Notifier for LineNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        debug!(alerts = group.alerts.len(), "Sending LINE notification");

        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let mut tmpl = renderer.session(&data);
        let body = format!(
            "{}\n{}\n\n{}",
            tmpl.named(DEFAULT_TITLE),
            renderer.rule_url(),
            tmpl.named(DEFAULT_MESSAGE),
        );
        finish_render(&self.base, tmpl)?;

        let request = DispatchRequest::post(LINE_NOTIFY_URL)
            .header("Authorization", format!("Bearer {}", self.token.expose()))
            .header(
                "Content-Type",
                "application/x-www-form-urlencoded;charset=UTF-8",
            )
            .form(&FormBody::new().set("message", body));

        self.deps.send(&self.base, cancel, request).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::alerting::channels::ChannelNotifier;
    use crate::alerting::secrets::PlainSettings;
    use crate::alerting::testing::{channel, deps, firing_alert, group, RecordingSender};
    use crate::models::AlertRecord;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    // The rule link keeps the scheme's double slash (`http%3A%2F%2Flocalhost`);
    // it is a plain join of the external URL and `/alerting/list`.
    #[rstest]
    #[case::one_alert(
        vec![firing_alert(&[("alertname", "alert1"), ("lbl1", "val1")], &[("ann1", "annv1")])],
        "message=%5BFIRING%3A1%5D++%28val1%29%0Ahttp%3A%2F%2Flocalhost%2Falerting%2Flist%0A%0A%0A%2A%2AFiring%2A%2A%0ALabels%3A%0A+-+alertname+%3D+alert1%0A+-+lbl1+%3D+val1%0AAnnotations%3A%0A+-+ann1+%3D+annv1%0ASource%3A+%0A%0A%0A%0A%0A"
    )]
    #[case::multiple_alerts(
        vec![
            firing_alert(&[("alertname", "alert1"), ("lbl1", "val1")], &[("ann1", "annv1")]),
            firing_alert(&[("alertname", "alert1"), ("lbl1", "val2")], &[("ann1", "annv2")]),
        ],
        "message=%5BFIRING%3A2%5D++%0Ahttp%3A%2F%2Flocalhost%2Falerting%2Flist%0A%0A%0A%2A%2AFiring%2A%2A%0ALabels%3A%0A+-+alertname+%3D+alert1%0A+-+lbl1+%3D+val1%0AAnnotations%3A%0A+-+ann1+%3D+annv1%0ASource%3A+%0ALabels%3A%0A+-+alertname+%3D+alert1%0A+-+lbl1+%3D+val2%0AAnnotations%3A%0A+-+ann1+%3D+annv2%0ASource%3A+%0A%0A%0A%0A%0A"
    )]
    #[tokio::test]
    async fn test_line_notify(#[case] alerts: Vec<AlertRecord>, #[case] expected_body: &str) {
        let sender = Arc::new(RecordingSender::default());
        let notifier = ChannelNotifier::new(
            &channel("line", json!({"token": "sometoken"})),
            &PlainSettings,
            &deps(sender.clone()),
        )
        .unwrap();

        let delivered = notifier
            .notify(&CancellationToken::new(), &group(alerts))
            .await
            .unwrap();
        assert!(delivered);

        let request = sender.single();
        assert_eq!(request.url, LINE_NOTIFY_URL);
        assert_eq!(
            request.headers,
            BTreeMap::from([
                ("Authorization".to_string(), "Bearer sometoken".to_string()),
                (
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded;charset=UTF-8".to_string()
                ),
            ])
        );
        assert_eq!(request.body_text(), expected_body);
    }

    #[test]
    fn test_token_missing() {
        let err = ChannelNotifier::new(
            &channel("line", json!({})),
            &PlainSettings,
            &deps(Arc::new(RecordingSender::default())),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Could not find token in settings");
    }

    #[tokio::test]
    async fn test_token_from_secure_settings() {
        let sender = Arc::new(RecordingSender::default());
        let decrypter = |field: &str, fallback: &str| {
            if field == "token" {
                "decrypted".to_string()
            } else {
                fallback.to_string()
            }
        };
        let notifier = ChannelNotifier::new(
            &channel("line", json!({})),
            &decrypter,
            &deps(sender.clone()),
        )
        .unwrap();

        notifier
            .notify(&CancellationToken::new(), &crate::alerting::testing::single_firing())
            .await
            .unwrap();
        assert_eq!(
            sender.single().headers["Authorization"],
            "Bearer decrypted"
        );
    }

    #[tokio::test]
    async fn test_payload_is_idempotent() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = ChannelNotifier::new(
            &channel("line", json!({"token": "t"})),
            &PlainSettings,
            &deps(sender.clone()),
        )
        .unwrap();
        let g = crate::alerting::testing::single_firing();

        notifier.notify(&CancellationToken::new(), &g).await.unwrap();
        notifier.notify(&CancellationToken::new(), &g).await.unwrap();

        let requests = sender.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].body, requests[1].body);
    }
}
