//! Channel notifiers
//!
//! One notifier per channel type, each validated once from a
//! [`ChannelConfig`] and immutable afterwards. [`ChannelNotifier`] is the
//! closed set of variants; [`ChannelNotifier::new`] is the factory mapping a
//! type tag to its constructor.

mod dingding;
mod discord;
mod googlechat;
mod kafka;
mod line;
mod opsgenie;
mod pagerduty;
mod pushover;
mod sensugo;
mod slack;
mod teams;
mod telegram;
mod threema;
mod victorops;
mod webhook;

pub use dingding::DingDingNotifier;
pub use discord::DiscordNotifier;
pub use googlechat::GoogleChatNotifier;
pub use kafka::KafkaNotifier;
pub use line::LineNotifier;
pub use opsgenie::OpsgenieNotifier;
pub use pagerduty::PagerDutyNotifier;
pub use pushover::PushoverNotifier;
pub use sensugo::SensuGoNotifier;
pub use slack::SlackNotifier;
pub use teams::TeamsNotifier;
pub use telegram::TelegramNotifier;
pub use threema::ThreemaNotifier;
pub use victorops::VictorOpsNotifier;
pub use webhook::WebhookNotifier;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::dispatch::{DispatchGateway, DispatchRequest};
use super::secrets::{Decrypter, Secret};
use super::template::{RenderSession, TemplateRenderer};
use crate::error::{Error, Result, TemplateError, ValidationError};
use crate::models::{AlertGroup, AlertStatus, ChannelConfig, ChannelKind, Settings};

/// Attachment colour for firing groups
pub const COLOR_FIRING: &str = "#D63232";

/// Attachment colour for resolved groups
pub const COLOR_RESOLVED: &str = "#36a64f";

/// Footer text attached to chat messages
pub const FOOTER_TEXT: &str = concat!("AlertRelay v", env!("CARGO_PKG_VERSION"));

/// Colour matching an aggregate status
pub fn status_color(status: AlertStatus) -> &'static str {
    match status {
        AlertStatus::Firing => COLOR_FIRING,
        AlertStatus::Resolved => COLOR_RESOLVED,
    }
}

/// Fields shared by every notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierBase {
    /// Channel identifier
    pub uid: String,
    /// Display name
    pub name: String,
    /// Channel type
    pub kind: ChannelKind,
    /// Resolve-suppression flag
    pub disable_resolve_message: bool,
}

impl NotifierBase {
    fn new(config: &ChannelConfig, kind: ChannelKind) -> Self {
        Self {
            uid: config.uid.clone(),
            name: config.name.clone(),
            kind,
            disable_resolve_message: config.disable_resolve_message,
        }
    }

    /// Whether fully resolved groups should be sent at all
    pub fn should_send_resolved(&self) -> bool {
        !self.disable_resolve_message
    }
}

/// Collaborators injected into every notifier
#[derive(Debug, Clone)]
pub struct NotifierDeps {
    /// Shared template registry
    pub renderer: Arc<TemplateRenderer>,
    /// Shared dispatch entry point
    pub gateway: DispatchGateway,
}

impl NotifierDeps {
    /// Dispatch `request`, logging failures against the channel
    pub(crate) async fn send(
        &self,
        base: &NotifierBase,
        cancel: &CancellationToken,
        request: DispatchRequest,
    ) -> Result<bool> {
        match self.gateway.dispatch(cancel, request).await {
            Ok(()) => Ok(true),
            Err(err) => {
                error!(
                    channel = %base.name,
                    kind = %base.kind,
                    error = %err,
                    "Failed to send notification"
                );
                Err(err.into())
            }
        }
    }
}

/// Close a render session, logging the first failed fragment
pub(crate) fn finish_render(base: &NotifierBase, session: RenderSession<'_>) -> Result<()> {
    session.finish().map_err(|err: TemplateError| {
        error!(channel = %base.name, kind = %base.kind, error = %err, "Failed to render notification");
        Error::from(err)
    })
}

/// Setting holding a credential: decrypted value, falling back to the plain setting
pub(crate) fn secret(settings: Settings<'_>, decrypter: &dyn Decrypter, key: &str) -> Secret {
    Secret::new(decrypter.decrypted_value(key, settings.str(key)))
}

/// Fail with `reason` when `value` is empty
pub(crate) fn require(value: &str, reason: &str) -> std::result::Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::new(reason))
    } else {
        Ok(())
    }
}

/// Cut `s` to at most `max` characters, marking the cut with an ellipsis
pub(crate) fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        return s;
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Capability pair every channel implements
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Shared channel fields
    fn base(&self) -> &NotifierBase;

    /// Render and deliver one notification for `group`.
    ///
    /// Returns `Ok(true)` once the gateway accepted the request. Template and
    /// dispatch failures are returned as errors; nothing is sent after a
    /// template failure.
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool>;

    /// Negation of the channel's resolve-suppression flag
    fn should_send_resolved(&self) -> bool {
        self.base().should_send_resolved()
    }
}

/// A live, validated notifier of one of the supported channel types
#[derive(Debug)]
pub enum ChannelNotifier {
    /// Threema Gateway
    Threema(ThreemaNotifier),
    /// LINE Notify
    Line(LineNotifier),
    /// Slack
    Slack(SlackNotifier),
    /// Generic webhook
    Webhook(WebhookNotifier),
    /// PagerDuty
    PagerDuty(PagerDutyNotifier),
    /// Telegram
    Telegram(TelegramNotifier),
    /// Discord
    Discord(DiscordNotifier),
    /// Google Chat
    GoogleChat(GoogleChatNotifier),
    /// Microsoft Teams
    Teams(TeamsNotifier),
    /// DingTalk
    DingDing(DingDingNotifier),
    /// Opsgenie
    Opsgenie(OpsgenieNotifier),
    /// VictorOps
    VictorOps(VictorOpsNotifier),
    /// Pushover
    Pushover(PushoverNotifier),
    /// Sensu Go
    SensuGo(SensuGoNotifier),
    /// Kafka REST proxy
    Kafka(KafkaNotifier),
}

impl ChannelNotifier {
    /// Validate `config` and build the matching notifier.
    ///
    /// Fails with the first violated constraint; no request is ever sent
    /// from here.
    pub fn new(
        config: &ChannelConfig,
        decrypter: &dyn Decrypter,
        deps: &NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let kind: ChannelKind = config.kind.parse()?;
        if !config.settings().is_object() {
            return Err(ValidationError::new("No Settings Supplied"));
        }

        let base = NotifierBase::new(config, kind);
        let settings = config.settings();
        let deps = deps.clone();

        Ok(match kind {
            ChannelKind::Threema => {
                Self::Threema(ThreemaNotifier::new(base, settings, decrypter, deps)?)
            }
            ChannelKind::Line => Self::Line(LineNotifier::new(base, settings, decrypter, deps)?),
            ChannelKind::Slack => Self::Slack(SlackNotifier::new(base, settings, decrypter, deps)?),
            ChannelKind::Webhook => {
                Self::Webhook(WebhookNotifier::new(base, settings, decrypter, deps)?)
            }
            ChannelKind::PagerDuty => {
                Self::PagerDuty(PagerDutyNotifier::new(base, settings, decrypter, deps)?)
            }
            ChannelKind::Telegram => {
                Self::Telegram(TelegramNotifier::new(base, settings, decrypter, deps)?)
            }
            ChannelKind::Discord => Self::Discord(DiscordNotifier::new(base, settings, deps)?),
            ChannelKind::GoogleChat => {
                Self::GoogleChat(GoogleChatNotifier::new(base, settings, deps)?)
            }
            ChannelKind::Teams => Self::Teams(TeamsNotifier::new(base, settings, deps)?),
            ChannelKind::DingDing => Self::DingDing(DingDingNotifier::new(base, settings, deps)?),
            ChannelKind::Opsgenie => {
                Self::Opsgenie(OpsgenieNotifier::new(base, settings, decrypter, deps)?)
            }
            ChannelKind::VictorOps => {
                Self::VictorOps(VictorOpsNotifier::new(base, settings, deps)?)
            }
            ChannelKind::Pushover => {
                Self::Pushover(PushoverNotifier::new(base, settings, decrypter, deps)?)
            }
            ChannelKind::SensuGo => {
                Self::SensuGo(SensuGoNotifier::new(base, settings, decrypter, deps)?)
            }
            ChannelKind::Kafka => Self::Kafka(KafkaNotifier::new(base, settings, deps)?),
        })
    }

    /// Channel type of this notifier
    pub fn kind(&self) -> ChannelKind {
        self.base().kind
    }

    fn as_notifier(&self) -> &dyn Notifier {
        match self {
            Self::Threema(n) => n,
            Self::Line(n) => n,
            Self::Slack(n) => n,
            Self::Webhook(n) => n,
            Self::PagerDuty(n) => n,
            Self::Telegram(n) => n,
            Self::Discord(n) => n,
            Self::GoogleChat(n) => n,
            Self::Teams(n) => n,
            Self::DingDing(n) => n,
            Self::Opsgenie(n) => n,
            Self::VictorOps(n) => n,
            Self::Pushover(n) => n,
            Self::SensuGo(n) => n,
            Self::Kafka(n) => n,
        }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    fn base(&self) -> &NotifierBase {
        self.as_notifier().base()
    }

    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        self.as_notifier().notify(cancel, group).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::secrets::PlainSettings;
    use crate::alerting::template::DEFAULT_MESSAGE;
    use crate::alerting::testing::{channel, deps, single_firing, single_resolved, RecordingSender};
    use crate::error::DispatchError;
    use rstest::rstest;
    use serde_json::json;

    fn build(config: &ChannelConfig) -> std::result::Result<ChannelNotifier, ValidationError> {
        ChannelNotifier::new(
            config,
            &PlainSettings,
            &deps(Arc::new(RecordingSender::default())),
        )
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short".to_string(), 10), "short");
        assert_eq!(truncate_chars("abcdef".to_string(), 4), "abc…");
        assert_eq!(truncate_chars("ééééé".to_string(), 3), "éé…");
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = build(&channel("carrier-pigeon", json!({}))).unwrap_err();
        assert_eq!(err.reason, "unsupported notification channel type: carrier-pigeon");
    }

    #[test]
    fn test_non_object_settings_are_rejected() {
        let err = build(&channel("line", json!(["token"]))).unwrap_err();
        assert_eq!(err.reason, "No Settings Supplied");
    }

    #[test]
    fn test_missing_settings_are_rejected() {
        let mut config = channel("threema", json!({}));
        config.settings = serde_json::Value::Null;

        let err = build(&config).unwrap_err();
        assert_eq!(err.reason, "No Settings Supplied");
    }

    #[rstest]
    #[case::threema("threema", "Could not find Threema Gateway ID in settings")]
    #[case::line("line", "Could not find token in settings")]
    #[case::webhook("webhook", "Could not find url property in settings")]
    #[case::pagerduty("pagerduty", "Could not find integration key property in settings")]
    #[case::telegram("telegram", "Could not find Bot Token in settings")]
    #[case::discord("discord", "Could not find webhook url property in settings")]
    #[case::googlechat("googlechat", "Could not find url property in settings")]
    #[case::teams("teams", "Could not find url property in settings")]
    #[case::dingding("dingding", "Could not find url property in settings")]
    #[case::opsgenie("opsgenie", "Could not find api key property in settings")]
    #[case::victorops("victorops", "Could not find victorops url property in settings")]
    #[case::pushover("pushover", "user key not found")]
    #[case::sensugo("sensugo", "Could not find URL property in settings")]
    #[case::kafka("kafka", "Could not find kafka rest proxy endpoint property in settings")]
    fn test_empty_settings_are_rejected(#[case] kind: &str, #[case] reason: &str) {
        let err = build(&channel(kind, json!({}))).unwrap_err();
        assert_eq!(err.reason, reason);
    }

    #[rstest]
    #[case(false, true)]
    #[case(true, false)]
    fn test_should_send_resolved_negates_flag(#[case] disabled: bool, #[case] expected: bool) {
        let mut config = channel("line", json!({"token": "t"}));
        config.disable_resolve_message = disabled;
        let notifier = build(&config).unwrap();

        assert_eq!(notifier.kind(), ChannelKind::Line);
        assert_eq!(notifier.should_send_resolved(), expected);
        assert_eq!(notifier.base().name, "line_testing");
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_reported() {
        let sender = Arc::new(RecordingSender::failing(DispatchError::Status {
            status: 503,
            body: "unavailable".to_string(),
        }));
        let notifier = ChannelNotifier::new(
            &channel("line", json!({"token": "t"})),
            &PlainSettings,
            &deps(sender.clone()),
        )
        .unwrap();

        let err = notifier
            .notify(&CancellationToken::new(), &single_firing())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Dispatch(DispatchError::Status { status: 503, .. })));
        assert_eq!(sender.requests().len(), 1);
    }

    #[rstest]
    #[case::slack("slack", json!({"url": "http://hooks.example/x", "title": "{{#if status}}oops"}))]
    #[case::teams("teams", json!({"url": "http://localhost/teams", "message": "{{#each alerts}}"}))]
    #[case::line_missing_partial("line", json!({"token": "t"}))]
    #[tokio::test]
    async fn test_template_failure_sends_nothing(
        #[case] kind: &str,
        #[case] settings: serde_json::Value,
    ) {
        let sender = Arc::new(RecordingSender::default());
        let mut deps = deps(sender.clone());
        if kind == "line" {
            let mut renderer = TemplateRenderer::new("http://localhost").unwrap();
            renderer
                .register_template(DEFAULT_MESSAGE, "{{> missing.partial}}")
                .unwrap();
            deps.renderer = Arc::new(renderer);
        }
        let notifier =
            ChannelNotifier::new(&channel(kind, settings), &PlainSettings, &deps).unwrap();

        let err = notifier
            .notify(&CancellationToken::new(), &single_firing())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Template(_)), "unexpected error: {err}");
        assert!(sender.requests().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_context_sends_nothing() {
        let sender = Arc::new(RecordingSender::default());
        let notifier = ChannelNotifier::new(
            &channel("line", json!({"token": "t"})),
            &PlainSettings,
            &deps(sender.clone()),
        )
        .unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = notifier.notify(&cancel, &single_resolved()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(sender.requests().is_empty());
    }
}
