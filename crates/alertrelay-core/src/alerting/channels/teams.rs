//! Microsoft Teams connector cards

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{finish_render, require, status_color, Notifier, NotifierBase, NotifierDeps};
use crate::alerting::dispatch::DispatchRequest;
use crate::alerting::template::{DEFAULT_MESSAGE_INLINE, DEFAULT_TITLE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, Settings};

/// Posts a MessageCard to a Teams incoming webhook
#[derive(Debug)]
pub struct TeamsNotifier {
    base: NotifierBase,
    url: String,
    message: String,
    deps: NotifierDeps,
}

impl TeamsNotifier {
    /// Validate settings: `url`
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let url = settings.str("url");
        require(url, "Could not find url property in settings")?;

        Ok(Self {
            base,
            url: url.to_string(),
            message: settings.str_or("message", DEFAULT_MESSAGE_INLINE).to_string(),
            deps,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageCard {
    #[serde(rename = "@type")]
    kind: &'static str,
    #[serde(rename = "@context")]
    context: &'static str,
    summary: String,
    title: String,
    theme_color: &'static str,
    sections: Vec<CardSection>,
    potential_action: Vec<CardAction>,
}

#[derive(Debug, Serialize)]
struct CardSection {
    title: &'static str,
    text: String,
}

#[derive(Debug, Serialize)]
struct CardAction {
    #[serde(rename = "@context")]
    context: &'static str,
    #[serde(rename = "@type")]
    kind: &'static str,
    name: &'static str,
    targets: Vec<CardTarget>,
}

#[derive(Debug, Serialize)]
struct CardTarget {
    os: &'static str,
    uri: String,
}

#[async_trait]
impl Notifier for TeamsNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        debug!(alerts = group.alerts.len(), "Sending Teams notification");

        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let mut tmpl = renderer.session(&data);
        let title = tmpl.named(DEFAULT_TITLE);
        let text = tmpl.text(&self.message);
        finish_render(&self.base, tmpl)?;

        let card = MessageCard {
            kind: "MessageCard",
            context: "http://schema.org/extensions",
            summary: title.clone(),
            title,
            theme_color: status_color(data.status),
            sections: vec![CardSection {
                title: "Details",
                text,
            }],
            potential_action: vec![CardAction {
                context: "http://schema.org",
                kind: "OpenUri",
                name: "View Rule",
                targets: vec![CardTarget {
                    os: "default",
                    uri: renderer.rule_url(),
                }],
            }],
        };

        let request = DispatchRequest::post(&self.url).json(&card)?;
        self.deps.send(&self.base, cancel, request).await
    }
}
