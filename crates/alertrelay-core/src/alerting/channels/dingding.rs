//! DingTalk robot webhooks

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{finish_render, require, Notifier, NotifierBase, NotifierDeps};
use crate::alerting::dispatch::{query_escape, DispatchRequest};
use crate::alerting::template::{DEFAULT_MESSAGE_INLINE, DEFAULT_TITLE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, Settings};

/// DingTalk message layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DingDingMessageType {
    /// Title, text and a link
    Link,
    /// Markdown card with a single button
    ActionCard,
}

/// Posts link or action-card messages to a DingTalk robot
#[derive(Debug)]
pub struct DingDingNotifier {
    base: NotifierBase,
    url: String,
    msg_type: DingDingMessageType,
    message: String,
    deps: NotifierDeps,
}

impl DingDingNotifier {
    /// Validate settings: `url`, `msgType`
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let url = settings.str("url");
        require(url, "Could not find url property in settings")?;

        let msg_type = match settings.str_or("msgType", "link") {
            "link" => DingDingMessageType::Link,
            "actionCard" => DingDingMessageType::ActionCard,
            other => {
                return Err(ValidationError::new(format!(
                    "Invalid msgType {other:?}: must be link or actionCard"
                )))
            }
        };

        Ok(Self {
            base,
            url: url.to_string(),
            msg_type,
            message: settings.str_or("message", DEFAULT_MESSAGE_INLINE).to_string(),
            deps,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "msgtype")]
enum DingDingMessage {
    #[serde(rename = "link")]
    Link { link: LinkContent },
    #[serde(rename = "actionCard")]
    ActionCard {
        #[serde(rename = "actionCard")]
        action_card: ActionCardContent,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkContent {
    text: String,
    title: String,
    message_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionCardContent {
    text: String,
    title: String,
    single_title: &'static str,
    #[serde(rename = "singleURL")]
    single_url: String,
}

#[async_trait]
impl Notifier for DingDingNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        debug!(msg_type = ?self.msg_type, "Sending DingDing notification");

        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let mut tmpl = renderer.session(&data);
        let title = tmpl.named(DEFAULT_TITLE);
        let text = tmpl.text(&self.message);
        finish_render(&self.base, tmpl)?;

        let link = format!(
            "dingtalk://dingtalkclient/page/link?pc_slide=false&url={}",
            query_escape(&renderer.rule_url())
        );
        let message = match self.msg_type {
            DingDingMessageType::Link => DingDingMessage::Link {
                link: LinkContent {
                    text,
                    title,
                    message_url: link,
                },
            },
            DingDingMessageType::ActionCard => DingDingMessage::ActionCard {
                action_card: ActionCardContent {
                    text,
                    title,
                    single_title: "More",
                    single_url: link,
                },
            },
        };

        let request = DispatchRequest::post(&self.url).json(&message)?;
        self.deps.send(&self.base, cancel, request).await
    }
}
