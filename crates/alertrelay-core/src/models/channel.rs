//! Notification channel configuration

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Channel type tags understood by the notifier factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Threema Gateway (simple mode)
    Threema,
    /// LINE Notify
    Line,
    /// Slack incoming webhook or chat API
    Slack,
    /// Generic JSON webhook
    Webhook,
    /// PagerDuty Events API v2
    PagerDuty,
    /// Telegram bot API
    Telegram,
    /// Discord webhook
    Discord,
    /// Google Chat webhook
    GoogleChat,
    /// Microsoft Teams connector
    Teams,
    /// DingTalk robot
    DingDing,
    /// Opsgenie alert API
    Opsgenie,
    /// VictorOps REST endpoint
    VictorOps,
    /// Pushover message API
    Pushover,
    /// Sensu Go events API
    SensuGo,
    /// Kafka REST proxy
    Kafka,
}

impl ChannelKind {
    /// Every supported kind, in catalogue order
    pub const ALL: [ChannelKind; 15] = [
        ChannelKind::Threema,
        ChannelKind::Line,
        ChannelKind::Slack,
        ChannelKind::Webhook,
        ChannelKind::PagerDuty,
        ChannelKind::Telegram,
        ChannelKind::Discord,
        ChannelKind::GoogleChat,
        ChannelKind::Teams,
        ChannelKind::DingDing,
        ChannelKind::Opsgenie,
        ChannelKind::VictorOps,
        ChannelKind::Pushover,
        ChannelKind::SensuGo,
        ChannelKind::Kafka,
    ];

    /// Type tag as it appears in configuration
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Threema => "threema",
            ChannelKind::Line => "line",
            ChannelKind::Slack => "slack",
            ChannelKind::Webhook => "webhook",
            ChannelKind::PagerDuty => "pagerduty",
            ChannelKind::Telegram => "telegram",
            ChannelKind::Discord => "discord",
            ChannelKind::GoogleChat => "googlechat",
            ChannelKind::Teams => "teams",
            ChannelKind::DingDing => "dingding",
            ChannelKind::Opsgenie => "opsgenie",
            ChannelKind::VictorOps => "victorops",
            ChannelKind::Pushover => "pushover",
            ChannelKind::SensuGo => "sensugo",
            ChannelKind::Kafka => "kafka",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                ValidationError::new(format!("unsupported notification channel type: {s}"))
            })
    }
}

/// Declarative description of one configured notification target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Stable channel identifier
    #[serde(default)]
    pub uid: String,

    /// Display name
    pub name: String,

    /// Type tag selecting the notifier implementation
    #[serde(rename = "type")]
    pub kind: String,

    /// Channel-specific settings (a JSON object)
    #[serde(default)]
    pub settings: serde_json::Value,

    /// Credential payloads keyed by setting name, resolved through a decrypter
    #[serde(default)]
    pub secure_settings: HashMap<String, String>,

    /// Suppress notifications for fully resolved groups
    #[serde(default)]
    pub disable_resolve_message: bool,
}

impl ChannelConfig {
    /// Read-only view over the settings object
    pub fn settings(&self) -> Settings<'_> {
        Settings(&self.settings)
    }
}

/// Lenient accessor over a channel's settings object.
///
/// Missing keys and values of the wrong type read as their empty default.
#[derive(Debug, Clone, Copy)]
pub struct Settings<'a>(&'a serde_json::Value);

impl<'a> Settings<'a> {
    /// Wrap a settings value
    pub fn new(value: &'a serde_json::Value) -> Self {
        Self(value)
    }

    /// Whether the settings are a JSON object at all
    pub fn is_object(&self) -> bool {
        self.0.is_object()
    }

    /// String value, or `""`
    pub fn str(&self, key: &str) -> &'a str {
        self.0.get(key).and_then(|v| v.as_str()).unwrap_or_default()
    }

    /// Trimmed string value, or `default` when empty
    pub fn str_or(&self, key: &str, default: &'a str) -> &'a str {
        match self.str(key).trim() {
            "" => default,
            value => value,
        }
    }

    /// Boolean value; accepts JSON booleans and `"true"`/`"false"` strings
    pub fn bool(&self, key: &str) -> bool {
        self.bool_or(key, false)
    }

    /// Boolean value, or `default` when missing or unparseable
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.0.get(key) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) if s.eq_ignore_ascii_case("true") => true,
            Some(serde_json::Value::String(s)) if s.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }

    /// Integer value; accepts JSON numbers and numeric strings
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}
