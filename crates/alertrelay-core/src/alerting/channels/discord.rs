//! Discord webhooks

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{
    finish_render, require, status_color, Notifier, NotifierBase, NotifierDeps, FOOTER_TEXT,
};
use crate::alerting::dispatch::DispatchRequest;
use crate::alerting::template::{DEFAULT_MESSAGE_INLINE, DEFAULT_TITLE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, Settings};

/// Username shown unless the webhook's own name is used
pub const DEFAULT_USERNAME: &str = "AlertRelay";

/// Posts embeds to a Discord webhook
#[derive(Debug)]
pub struct DiscordNotifier {
    base: NotifierBase,
    url: String,
    avatar_url: String,
    content: String,
    use_discord_username: bool,
    deps: NotifierDeps,
}

impl DiscordNotifier {
    /// Validate settings: `url`
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let url = settings.str("url");
        require(url, "Could not find webhook url property in settings")?;

        Ok(Self {
            base,
            url: url.to_string(),
            avatar_url: settings.str("avatar_url").to_string(),
            content: settings.str_or("message", DEFAULT_MESSAGE_INLINE).to_string(),
            use_discord_username: settings.bool("use_discord_username"),
            deps,
        })
    }
}

#[derive(Debug, Serialize)]
struct DiscordMessage {
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'static str>,
    #[serde(skip_serializing_if = "String::is_empty")]
    avatar_url: String,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    url: String,
    #[serde(rename = "type")]
    kind: &'static str,
    color: u32,
    footer: DiscordFooter,
}

#[derive(Debug, Serialize)]
struct DiscordFooter {
    text: &'static str,
}

fn color_value(hex: &str) -> u32 {
    u32::from_str_radix(hex.trim_start_matches('#'), 16).unwrap_or_default()
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        debug!(alerts = group.alerts.len(), "Sending Discord notification");

        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let mut tmpl = renderer.session(&data);
        let content = tmpl.text(&self.content);
        let title = tmpl.named(DEFAULT_TITLE);
        finish_render(&self.base, tmpl)?;

        let message = DiscordMessage {
            content,
            username: (!self.use_discord_username).then_some(DEFAULT_USERNAME),
            avatar_url: self.avatar_url.clone(),
            embeds: vec![DiscordEmbed {
                title,
                url: renderer.rule_url(),
                kind: "rich",
                color: color_value(status_color(data.status)),
                footer: DiscordFooter { text: FOOTER_TEXT },
            }],
        };

        let request = DispatchRequest::post(&self.url).json(&message)?;
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

    #[tokio::test]
    async fn test_embed_message() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = ChannelNotifier::new(
            &channel(
                "discord",
                json!({"url": "http://localhost/discord", "avatar_url": "http://localhost/a.png"}),
            ),
            &PlainSettings,
            &deps(sender.clone()),
        )
        .unwrap();

        notifier
            .notify(&CancellationToken::new(), &single_firing())
            .await
            .unwrap();

        let request = sender.single();
        assert_eq!(request.url, "http://localhost/discord");
        assert_eq!(
            json_body(&request),
            json!({
                "content": "\n**Firing**\nLabels:\n - alertname = alert1\n - lbl1 = val1\nAnnotations:\n - ann1 = annv1\nSource: \n\n\n\n\n",
                "username": "AlertRelay",
                "avatar_url": "http://localhost/a.png",
                "embeds": [{
                    "title": "[FIRING:1]  (val1)",
                    "url": "http://localhost/alerting/list",
                    "type": "rich",
                    "color": 14037554,
                    "footer": {"text": FOOTER_TEXT}
                }]
            })
        );
    }

    #[tokio::test]
    async fn test_resolved_colour_and_webhook_username() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = ChannelNotifier::new(
            &channel(
                "discord",
                json!({"url": "http://localhost/discord", "use_discord_username": true}),
            ),
            &PlainSettings,
            &deps(sender.clone()),
        )
        .unwrap();

        notifier
            .notify(&CancellationToken::new(), &single_resolved())
            .await
            .unwrap();

        let body = json_body(&sender.single());
        assert_eq!(body["embeds"][0]["color"], 3581519);
        assert!(body.get("username").is_none());
    }
}
