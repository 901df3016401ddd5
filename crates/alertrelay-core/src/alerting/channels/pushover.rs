//! Pushover message API

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{
    finish_render, require, secret, truncate_chars, Notifier, NotifierBase, NotifierDeps,
};
use crate::alerting::dispatch::{DispatchRequest, FormBody, CONTENT_TYPE_FORM};
use crate::alerting::secrets::{Decrypter, Secret};
use crate::alerting::template::{DEFAULT_MESSAGE_INLINE, DEFAULT_TITLE_INLINE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, AlertStatus, Settings};

/// Pushover messages endpoint
pub const PUSHOVER_API_URL: &str = "https://api.pushover.net/1/messages.json";

const EMERGENCY_PRIORITY: i64 = 2;
const MESSAGE_MAX_CHARS: usize = 1024;

/// Sends push notifications through Pushover
#[derive(Debug)]
pub struct PushoverNotifier {
    base: NotifierBase,
    user_key: Secret,
    api_token: Secret,
    alerting_priority: i64,
    ok_priority: i64,
    retry: i64,
    expire: i64,
    device: String,
    alerting_sound: String,
    ok_sound: String,
    title: String,
    message: String,
    deps: NotifierDeps,
}

impl PushoverNotifier {
    /// Validate settings in order: `userKey` (secret), `apiToken` (secret)
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        decrypter: &dyn Decrypter,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let user_key = secret(settings, decrypter, "userKey");
        let api_token = secret(settings, decrypter, "apiToken");

        require(user_key.expose(), "user key not found")?;
        require(api_token.expose(), "API token not found")?;

        Ok(Self {
            base,
            user_key,
            api_token,
            alerting_priority: settings.int("priority").unwrap_or(0),
            ok_priority: settings.int("okPriority").unwrap_or(0),
            retry: settings.int("retry").unwrap_or(0),
            expire: settings.int("expire").unwrap_or(0),
            device: settings.str("device").to_string(),
            alerting_sound: settings.str("sound").to_string(),
            ok_sound: settings.str("okSound").to_string(),
            title: settings.str_or("title", DEFAULT_TITLE_INLINE).to_string(),
            message: settings.str_or("message", DEFAULT_MESSAGE_INLINE).to_string(),
            deps,
        })
    }
}

#[async_trait]
impl Notifier for PushoverNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let (priority, sound) = match data.status {
            AlertStatus::Firing => (self.alerting_priority, &self.alerting_sound),
            AlertStatus::Resolved => (self.ok_priority, &self.ok_sound),
        };
        debug!(priority, "Sending Pushover notification");

        let mut tmpl = renderer.session(&data);
        let title = tmpl.text(&self.title);
        let message = tmpl.text(&self.message);
        finish_render(&self.base, tmpl)?;

        let mut form = FormBody::new()
            .set("user", self.user_key.expose())
            .set("token", self.api_token.expose())
            .set("priority", priority.to_string())
            .set("title", title)
            .set("message", truncate_chars(message, MESSAGE_MAX_CHARS))
            .set("url", renderer.rule_url())
            .set("url_title", "Show alert rule")
            .set("html", "1")
            .set_non_empty("device", &self.device)
            .set_non_empty("sound", sound);
        if priority == EMERGENCY_PRIORITY {
            form = form
                .set("retry", self.retry.to_string())
                .set("expire", self.expire.to_string());
        }

        let request = DispatchRequest::post(PUSHOVER_API_URL)
            .header("Content-Type", CONTENT_TYPE_FORM)
            .form(&form);
        self.deps.send(&self.base, cancel, request).await
    }
}
