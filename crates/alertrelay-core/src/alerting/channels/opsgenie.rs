//! Opsgenie alert API

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::pagerduty::dedup_key;
use super::{
    finish_render, require, secret, truncate_chars, Notifier, NotifierBase, NotifierDeps,
};
use crate::alerting::dispatch::{path_escape, DispatchRequest};
use crate::alerting::secrets::{Decrypter, Secret};
use crate::alerting::template::{DEFAULT_MESSAGE, DEFAULT_TITLE};
use crate::error::{DispatchError, Result, ValidationError};
use crate::models::{AlertGroup, AlertStatus, Settings};

/// Default Opsgenie alerts endpoint
pub const OPSGENIE_ALERTS_URL: &str = "https://api.opsgenie.com/v2/alerts";

/// Annotation overriding the alert priority
pub const PRIORITY_ANNOTATION: &str = "og_priority";

const SOURCE: &str = "AlertRelay";
const MESSAGE_MAX_CHARS: usize = 130;

/// Where common labels are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTagsAs {
    /// As `key:value` tags
    Tags,
    /// As entries of `details`
    Details,
    /// Both
    Both,
}

/// Creates and closes Opsgenie alerts
#[derive(Debug)]
pub struct OpsgenieNotifier {
    base: NotifierBase,
    api_key: Secret,
    api_url: String,
    auto_close: bool,
    override_priority: bool,
    send_tags_as: SendTagsAs,
    deps: NotifierDeps,
}

impl OpsgenieNotifier {
    /// Validate settings: `apiKey` (secret), `sendTagsAs`
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        decrypter: &dyn Decrypter,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let api_key = secret(settings, decrypter, "apiKey");
        require(api_key.expose(), "Could not find api key property in settings")?;

        let send_tags_as = match settings.str_or("sendTagsAs", "tags") {
            "tags" => SendTagsAs::Tags,
            "details" => SendTagsAs::Details,
            "both" => SendTagsAs::Both,
            other => {
                return Err(ValidationError::new(format!(
                    "Invalid value for sendTagsAs: {other:?}"
                )))
            }
        };

        Ok(Self {
            base,
            api_key,
            api_url: settings
                .str_or("apiUrl", OPSGENIE_ALERTS_URL)
                .trim_end_matches('/')
                .to_string(),
            auto_close: settings.bool_or("autoClose", true),
            override_priority: settings.bool_or("overridePriority", true),
            send_tags_as,
            deps,
        })
    }

    fn create_request(&self, group: &AlertGroup) -> Result<DispatchRequest> {
        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let mut tmpl = renderer.session(&data);
        let title = tmpl.named(DEFAULT_TITLE);
        let rule_url = renderer.rule_url();
        let description = format!("{title}\n{rule_url}\n\n{}", tmpl.named(DEFAULT_MESSAGE));
        finish_render(&self.base, tmpl)?;

        let common_labels = group.common_labels();
        let mut details = BTreeMap::from([("url".to_string(), rule_url)]);
        let mut tags = Vec::new();
        for (name, value) in common_labels.iter() {
            if matches!(self.send_tags_as, SendTagsAs::Details | SendTagsAs::Both) {
                details.insert(name.to_string(), value.to_string());
            }
            if matches!(self.send_tags_as, SendTagsAs::Tags | SendTagsAs::Both) {
                tags.push(format!("{name}:{value}"));
            }
        }

        let priority = if self.override_priority {
            group
                .common_annotations()
                .get(PRIORITY_ANNOTATION)
                .filter(|p| matches!(*p, "P1" | "P2" | "P3" | "P4" | "P5"))
                .map(str::to_string)
        } else {
            None
        };

        let payload = CreateAlert {
            message: truncate_chars(title, MESSAGE_MAX_CHARS),
            description,
            alias: dedup_key(&group.key),
            details,
            tags,
            source: SOURCE,
            priority,
        };

        Ok(DispatchRequest::post(&self.api_url)
            .header("Authorization", format!("GenieKey {}", self.api_key.expose()))
            .json(&payload)?)
    }

    fn close_request(&self, group: &AlertGroup) -> Result<DispatchRequest> {
        let url = format!(
            "{}/{}/close?identifierType=alias",
            self.api_url,
            path_escape(&dedup_key(&group.key))
        );
        Ok(DispatchRequest::post(url)
            .header("Authorization", format!("GenieKey {}", self.api_key.expose()))
            .json(&CloseAlert { source: SOURCE })?)
    }
}

#[derive(Debug, Serialize)]
struct CreateAlert {
    message: String,
    description: String,
    alias: String,
    details: BTreeMap<String, String>,
    tags: Vec<String>,
    source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<String>,
}

#[derive(Debug, Serialize)]
struct CloseAlert {
    source: &'static str,
}

#[async_trait]
impl Notifier for OpsgenieNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        let request = match group.status() {
            AlertStatus::Firing => self.create_request(group)?,
            AlertStatus::Resolved if self.auto_close => self.close_request(group)?,
            AlertStatus::Resolved => {
                if cancel.is_cancelled() {
                    return Err(DispatchError::Cancelled.into());
                }
                debug!("Not closing Opsgenie alert, autoClose is disabled");
                return Ok(true);
            }
        };
        debug!(url = %request.url, "Sending Opsgenie notification");

        self.deps.send(&self.base, cancel, request).await
    }
}
