//! Threema Gateway, simple mode

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{finish_render, require, secret, Notifier, NotifierBase, NotifierDeps};
use crate::alerting::dispatch::{DispatchRequest, FormBody, CONTENT_TYPE_FORM};
use crate::alerting::secrets::{Decrypter, Secret};
use crate::alerting::template::{DEFAULT_MESSAGE, DEFAULT_TITLE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, AlertStatus, Settings};

/// Threema Gateway simple-mode endpoint
pub const THREEMA_GATEWAY_URL: &str = "https://msgapi.threema.ch/send_simple";

const ID_LENGTH: usize = 8;

/// Sends notifications through the Threema Gateway
#[derive(Debug)]
pub struct ThreemaNotifier {
    base: NotifierBase,
    gateway_id: String,
    recipient_id: String,
    api_secret: Secret,
    deps: NotifierDeps,
}

impl ThreemaNotifier {
    /// Validate settings in order: `gateway_id`, `recipient_id`, `api_secret` (secret)
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        decrypter: &dyn Decrypter,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let gateway_id = settings.str("gateway_id");
        let recipient_id = settings.str("recipient_id");
        let api_secret = secret(settings, decrypter, "api_secret");

        require(gateway_id, "Could not find Threema Gateway ID in settings")?;
        if !gateway_id.starts_with('*') {
            return Err(ValidationError::new(
                "Invalid Threema Gateway ID: Must start with a *",
            ));
        }
        if gateway_id.len() != ID_LENGTH {
            return Err(ValidationError::new(
                "Invalid Threema Gateway ID: Must be 8 characters long",
            ));
        }
        require(recipient_id, "Could not find Threema Recipient ID in settings")?;
        if recipient_id.len() != ID_LENGTH {
            return Err(ValidationError::new(
                "Invalid Threema Recipient ID: Must be 8 characters long",
            ));
        }
        require(
            api_secret.expose(),
            "Could not find Threema API secret in settings",
        )?;

        Ok(Self {
            base,
            gateway_id: gateway_id.to_string(),
            recipient_id: recipient_id.to_string(),
            api_secret,
            deps,
        })
    }
}

fn state_emoji(status: AlertStatus) -> &'static str {
    match status {
        AlertStatus::Firing => "\u{26A0}\u{FE0F} ",
        AlertStatus::Resolved => "\u{2705} ",
    }
}

#[async_trait]
impl Notifier for ThreemaNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        debug!(
            from = %self.gateway_id,
            to = %self.recipient_id,
            "Sending Threema notification"
        );

        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let mut tmpl = renderer.session(&data);
        let text = format!(
            "{}{}\n\n*Message:*\n{}\n*URL:* {}\n",
            state_emoji(data.status),
            tmpl.named(DEFAULT_TITLE),
            tmpl.named(DEFAULT_MESSAGE),
            renderer.rule_url(),
        );
        finish_render(&self.base, tmpl)?;

        let form = FormBody::new()
            .set("from", &self.gateway_id)
            .set("to", &self.recipient_id)
            .set("secret", self.api_secret.expose())
            .set("text", text);
        let request = DispatchRequest::post(THREEMA_GATEWAY_URL)
            .header("Content-Type", CONTENT_TYPE_FORM)
            .form(&form);

        self.deps.send(&self.base, cancel, request).await
    }
}
