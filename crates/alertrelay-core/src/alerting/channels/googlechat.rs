//! Google Chat incoming webhooks

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{finish_render, require, Notifier, NotifierBase, NotifierDeps, FOOTER_TEXT};
use crate::alerting::dispatch::DispatchRequest;
use crate::alerting::template::{DEFAULT_MESSAGE, DEFAULT_TITLE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, Settings};

/// Posts a card message to a Google Chat space
#[derive(Debug)]
pub struct GoogleChatNotifier {
    base: NotifierBase,
    url: String,
    deps: NotifierDeps,
}

impl GoogleChatNotifier {
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
            deps,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatMessage {
    preview_text: String,
    fallback_text: String,
    cards: Vec<Card>,
}

#[derive(Debug, Serialize)]
struct Card {
    header: Header,
    sections: Vec<Section>,
}

#[derive(Debug, Serialize)]
struct Header {
    title: String,
}

#[derive(Debug, Serialize)]
struct Section {
    widgets: Vec<Widget>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Widget {
    TextParagraph { text: String },
    Buttons(Vec<Button>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Button {
    text_button: TextButton,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextButton {
    text: &'static str,
    on_click: OnClick,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OnClick {
    open_link: OpenLink,
}

#[derive(Debug, Serialize)]
struct OpenLink {
    url: String,
}

#[async_trait]
impl Notifier for GoogleChatNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        debug!(alerts = group.alerts.len(), "Sending Google Chat notification");

        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let mut tmpl = renderer.session(&data);
        let title = tmpl.named(DEFAULT_TITLE);
        let message = tmpl.named(DEFAULT_MESSAGE);
        finish_render(&self.base, tmpl)?;

        let mut widgets = Vec::with_capacity(3);
        if !message.is_empty() {
            widgets.push(Widget::TextParagraph { text: message });
        }
        widgets.push(Widget::Buttons(vec![Button {
            text_button: TextButton {
                text: "OPEN IN ALERTRELAY",
                on_click: OnClick {
                    open_link: OpenLink {
                        url: renderer.rule_url(),
                    },
                },
            },
        }]));
        widgets.push(Widget::TextParagraph {
            text: format!(
                "<font color=\"#8e8e8e\">{FOOTER_TEXT} | {}</font>",
                Utc::now().format("%d %b %y %H:%M UTC")
            ),
        });

        let payload = ChatMessage {
            preview_text: title.clone(),
            fallback_text: title.clone(),
            cards: vec![Card {
                header: Header { title },
                sections: vec![Section { widgets }],
            }],
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
    use crate::alerting::testing::{channel, deps, json_body, single_firing, RecordingSender};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_card_message() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = ChannelNotifier::new(
            &channel("googlechat", json!({"url": "http://localhost/chat"})),
            &PlainSettings,
            &deps(sender.clone()),
        )
        .unwrap();

        notifier
            .notify(&CancellationToken::new(), &single_firing())
            .await
            .unwrap();

        let mut body = json_body(&sender.single());
        let widgets = body["cards"][0]["sections"][0]["widgets"]
            .as_array_mut()
            .unwrap();
        let footer = widgets.pop().unwrap();
        assert!(footer["textParagraph"]["text"]
            .as_str()
            .unwrap()
            .starts_with("<font color=\"#8e8e8e\">AlertRelay v"));

        assert_eq!(
            body,
            json!({
                "previewText": "[FIRING:1]  (val1)",
                "fallbackText": "[FIRING:1]  (val1)",
                "cards": [{
                    "header": {"title": "[FIRING:1]  (val1)"},
                    "sections": [{
                        "widgets": [
                            {"textParagraph": {"text": "\n**Firing**\nLabels:\n - alertname = alert1\n - lbl1 = val1\nAnnotations:\n - ann1 = annv1\nSource: \n\n\n\n\n"}},
                            {"buttons": [{"textButton": {
                                "text": "OPEN IN ALERTRELAY",
                                "onClick": {"openLink": {"url": "http://localhost/alerting/list"}}
                            }}]}
                        ]
                    }]
                }]
            })
        );
    }
}
