//! Telegram bot API

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{finish_render, require, secret, Notifier, NotifierBase, NotifierDeps};
use crate::alerting::dispatch::{DispatchRequest, FormBody, CONTENT_TYPE_FORM};
use crate::alerting::secrets::{Decrypter, Secret};
use crate::alerting::template::DEFAULT_MESSAGE_INLINE;
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, Settings};

/// Base of the Telegram bot API
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Sends messages through a Telegram bot
#[derive(Debug)]
pub struct TelegramNotifier {
    base: NotifierBase,
    bot_token: Secret,
    chat_id: String,
    message: String,
    deps: NotifierDeps,
}

impl TelegramNotifier {
    /// Validate settings in order: `bottoken` (secret), `chatid`
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        decrypter: &dyn Decrypter,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let bot_token = secret(settings, decrypter, "bottoken");
        let chat_id = settings.str("chatid");

        require(bot_token.expose(), "Could not find Bot Token in settings")?;
        require(chat_id, "Could not find Chat Id in settings")?;

        Ok(Self {
            base,
            bot_token,
            chat_id: chat_id.to_string(),
            message: settings.str_or("message", DEFAULT_MESSAGE_INLINE).to_string(),
            deps,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{TELEGRAM_API_BASE}/bot{}/sendMessage",
            self.bot_token.expose()
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        debug!(chat_id = %self.chat_id, "Sending Telegram notification");

        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let mut tmpl = renderer.session(&data);
        let text = tmpl.text(&self.message);
        finish_render(&self.base, tmpl)?;

        let form = FormBody::new()
            .set("chat_id", &self.chat_id)
            .set("parse_mode", "html")
            .set("text", text);
        let request = DispatchRequest::post(self.endpoint())
            .header("Content-Type", CONTENT_TYPE_FORM)
            .form(&form);

        self.deps.send(&self.base, cancel, request).await
    }
}
