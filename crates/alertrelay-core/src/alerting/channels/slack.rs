//! Slack incoming webhooks and chat API

use async_trait::async_trait;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::{
    finish_render, secret, status_color, Notifier, NotifierBase, NotifierDeps, FOOTER_TEXT,
};
use crate::alerting::dispatch::DispatchRequest;
use crate::alerting::secrets::{Decrypter, Secret};
use crate::alerting::template::{DEFAULT_MESSAGE_INLINE, DEFAULT_TITLE_INLINE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, Settings};

/// Slack chat API endpoint, used when no webhook URL is configured
pub const SLACK_API_ENDPOINT: &str = "https://slack.com/api/chat.postMessage";

static RECIPIENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((@[a-z0-9][a-zA-Z0-9._-]*)|(#[^ .A-Z]{1,79})|([a-zA-Z0-9]+))$")
        .expect("Invalid recipient regex")
});

/// Sends notifications to Slack
#[derive(Debug)]
pub struct SlackNotifier {
    base: NotifierBase,
    url: String,
    token: Secret,
    recipient: String,
    mention_channel: String,
    mention_users: Vec<String>,
    mention_groups: Vec<String>,
    username: String,
    icon_emoji: String,
    icon_url: String,
    title: String,
    text: String,
    deps: NotifierDeps,
}

fn comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl SlackNotifier {
    /// Validate settings in order: `url` (secret), `recipient`,
    /// `mentionChannel`, `token` (secret)
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        decrypter: &dyn Decrypter,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let raw_url = secret(settings, decrypter, "url");
        let raw_url = match raw_url.expose().trim() {
            "" => SLACK_API_ENDPOINT,
            url => url,
        };
        let url = Url::parse(raw_url)
            .map_err(|_| ValidationError::new(format!("invalid URL {raw_url:?}")))?;
        let is_chat_api = url.as_str() == SLACK_API_ENDPOINT;

        let recipient = settings.str("recipient").trim();
        if !recipient.is_empty() {
            if !RECIPIENT_PATTERN.is_match(recipient) {
                return Err(ValidationError::new(format!(
                    "recipient on invalid format: {recipient:?}"
                )));
            }
        } else if is_chat_api {
            return Err(ValidationError::new(
                "recipient must be specified when using the Slack chat API",
            ));
        }

        let mention_channel = settings.str("mentionChannel");
        if !matches!(mention_channel, "" | "here" | "channel") {
            return Err(ValidationError::new(format!(
                "invalid value for mentionChannel: {mention_channel:?}"
            )));
        }

        let token = secret(settings, decrypter, "token");
        if token.is_empty() && is_chat_api {
            return Err(ValidationError::new(
                "token must be specified when using the Slack chat API",
            ));
        }

        Ok(Self {
            base,
            url: url.to_string(),
            token,
            recipient: recipient.to_string(),
            mention_channel: mention_channel.to_string(),
            mention_users: comma_list(settings.str("mentionUsers")),
            mention_groups: comma_list(settings.str("mentionGroups")),
            username: settings.str("username").to_string(),
            icon_emoji: settings.str("icon_emoji").to_string(),
            icon_url: settings.str("icon_url").to_string(),
            title: settings.str_or("title", DEFAULT_TITLE_INLINE).to_string(),
            text: settings.str_or("text", DEFAULT_MESSAGE_INLINE).to_string(),
            deps,
        })
    }

    fn mentions(&self) -> String {
        let mut parts = Vec::new();
        if !self.mention_channel.is_empty() {
            parts.push(format!(
                "<!{}|{}>",
                self.mention_channel, self.mention_channel
            ));
        }
        parts.extend(self.mention_groups.iter().map(|g| format!("<!subteam^{g}>")));
        parts.extend(self.mention_users.iter().map(|u| format!("<@{u}>")));
        parts.join(" ")
    }

    fn build_message(&self, group: &AlertGroup) -> Result<SlackMessage> {
        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let mut tmpl = renderer.session(&data);
        let title = tmpl.text(&self.title);
        let text = tmpl.text(&self.text);
        finish_render(&self.base, tmpl)?;

        let mentions = self.mentions();
        let blocks = if mentions.is_empty() {
            Vec::new()
        } else {
            vec![SlackBlock {
                kind: "section",
                text: SlackText {
                    kind: "mrkdwn",
                    text: mentions,
                },
            }]
        };

        Ok(SlackMessage {
            channel: self.recipient.clone(),
            username: self.username.clone(),
            icon_emoji: self.icon_emoji.clone(),
            icon_url: self.icon_url.clone(),
            attachments: vec![SlackAttachment {
                color: status_color(data.status),
                fallback: title.clone(),
                title,
                title_link: renderer.rule_url(),
                text,
                footer: FOOTER_TEXT,
                ts: Utc::now().timestamp(),
            }],
            blocks,
        })
    }
}

#[derive(Debug, Serialize)]
struct SlackMessage {
    #[serde(skip_serializing_if = "String::is_empty")]
    channel: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    icon_emoji: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    icon_url: String,
    attachments: Vec<SlackAttachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    blocks: Vec<SlackBlock>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: &'static str,
    title: String,
    title_link: String,
    text: String,
    fallback: String,
    footer: &'static str,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct SlackBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: SlackText,
}

#[derive(Debug, Serialize)]
struct SlackText {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        debug!(recipient = %self.recipient, "Sending Slack notification");

        let message = self.build_message(group)?;
        let mut request = DispatchRequest::post(&self.url).json(&message)?;
        if !self.token.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.token.expose()));
        }

        self.deps.send(&self.base, cancel, request).await
    }
}
