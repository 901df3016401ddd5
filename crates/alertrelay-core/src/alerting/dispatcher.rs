//! Fan-out of one alert group to every configured channel

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::channels::{ChannelNotifier, Notifier, NotifierDeps};
use super::classifier;
use super::secrets::SecureSettings;
use crate::error::ValidationError;
use crate::models::{AlertGroup, AlertStatus, ChannelConfig, ChannelKind};

/// What happened to one channel during a fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "lowercase")]
pub enum Outcome {
    /// The gateway accepted the notification
    Delivered,
    /// Rendering or delivery failed
    Failed(String),
    /// Skipped because the channel does not send resolved notifications
    Suppressed,
}

/// Result of notifying one channel
#[derive(Debug, Clone, Serialize)]
pub struct NotificationResult {
    /// Channel identifier
    pub channel_uid: String,
    /// Channel type
    pub channel_type: ChannelKind,
    /// What happened
    #[serde(flatten)]
    pub outcome: Outcome,
    /// When the attempt finished
    pub sent_at: DateTime<Utc>,
}

impl NotificationResult {
    /// Whether the notification was delivered
    pub fn success(&self) -> bool {
        self.outcome == Outcome::Delivered
    }
}

/// A channel configuration that failed validation
#[derive(Debug, Clone)]
pub struct Rejection {
    /// Channel identifier
    pub channel_uid: String,
    /// Channel display name
    pub channel_name: String,
    /// First violated constraint
    pub error: ValidationError,
}

/// Live notifiers built from a set of channel configurations
#[derive(Debug, Default)]
pub struct Dispatcher {
    notifiers: Vec<ChannelNotifier>,
}

impl Dispatcher {
    /// Validate every config, keeping the ones that pass.
    ///
    /// Credentials are read from each config's `secure_settings`.
    pub fn from_configs(configs: &[ChannelConfig], deps: &NotifierDeps) -> (Self, Vec<Rejection>) {
        let mut notifiers = Vec::with_capacity(configs.len());
        let mut rejections = Vec::new();

        for config in configs {
            let decrypter = SecureSettings::new(&config.secure_settings);
            match ChannelNotifier::new(config, &decrypter, deps) {
                Ok(notifier) => notifiers.push(notifier),
                Err(error) => {
                    warn!(
                        channel_uid = %config.uid,
                        channel = %config.name,
                        kind = %config.kind,
                        error = %error,
                        "Rejected channel configuration"
                    );
                    rejections.push(Rejection {
                        channel_uid: config.uid.clone(),
                        channel_name: config.name.clone(),
                        error,
                    });
                }
            }
        }

        (Self { notifiers }, rejections)
    }

    /// Keep only the channel with `uid`
    pub fn retain_uid(&mut self, uid: &str) {
        self.notifiers.retain(|n| n.base().uid == uid);
    }

    /// Live notifiers
    pub fn notifiers(&self) -> &[ChannelNotifier] {
        &self.notifiers
    }

    /// Number of live notifiers
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// Whether no channel survived validation
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Notify every channel concurrently, one result per channel in
    /// configuration order
    pub async fn dispatch_all(
        &self,
        cancel: &CancellationToken,
        group: &AlertGroup,
    ) -> Vec<NotificationResult> {
        let classification = classifier::classify(&group.alerts);
        info!(
            group_key = %group.key,
            status = %classification.status,
            firing = classification.firing,
            resolved = classification.resolved,
            channels = self.notifiers.len(),
            "Dispatching alert group"
        );

        let suppress = classification.status == AlertStatus::Resolved;
        join_all(
            self.notifiers
                .iter()
                .map(|notifier| Self::notify_one(notifier, cancel, group, suppress)),
        )
        .await
    }

    async fn notify_one(
        notifier: &ChannelNotifier,
        cancel: &CancellationToken,
        group: &AlertGroup,
        resolved: bool,
    ) -> NotificationResult {
        let base = notifier.base();
        let outcome = if resolved && !notifier.should_send_resolved() {
            info!(channel = %base.name, "Resolved notification suppressed");
            Outcome::Suppressed
        } else {
            match notifier.notify(cancel, group).await {
                Ok(true) => Outcome::Delivered,
                Ok(false) => Outcome::Failed("notification not sent".to_string()),
                Err(err) => Outcome::Failed(err.to_string()),
            }
        };

        NotificationResult {
            channel_uid: base.uid.clone(),
            channel_type: base.kind,
            outcome,
            sent_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::alerting::testing::{channel, deps, single_firing, single_resolved, RecordingSender};
    use crate::error::DispatchError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn configs() -> Vec<ChannelConfig> {
        let mut suppressed = channel("webhook", json!({"url": "http://localhost/hook"}));
        suppressed.disable_resolve_message = true;
        vec![
            channel("line", json!({"token": "t"})),
            channel("telegram", json!({"chatid": "42"})),
            suppressed,
        ]
    }

    #[test]
    fn test_rejected_configs_are_reported() {
        let (dispatcher, rejections) = Dispatcher::from_configs(
            &configs(),
            &deps(Arc::new(RecordingSender::default())),
        );

        assert_eq!(dispatcher.len(), 2);
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].channel_uid, "telegram-uid");
        assert_eq!(rejections[0].error.reason, "Could not find Bot Token in settings");
    }

    #[test]
    fn test_secure_settings_are_decrypted() {
        let mut config = channel("line", json!({}));
        config.secure_settings = HashMap::from([("token".to_string(), "s3cret".to_string())]);

        let (dispatcher, rejections) =
            Dispatcher::from_configs(&[config], &deps(Arc::new(RecordingSender::default())));

        assert!(rejections.is_empty());
        assert_eq!(dispatcher.len(), 1);
    }

    #[tokio::test]
    async fn test_firing_group_reaches_every_channel() {
        let sender = Arc::new(RecordingSender::default());
        let (dispatcher, _) = Dispatcher::from_configs(&configs(), &deps(sender.clone()));

        let results = dispatcher
            .dispatch_all(&CancellationToken::new(), &single_firing())
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(NotificationResult::success));
        assert_eq!(results[0].channel_type, ChannelKind::Line);
        assert_eq!(results[1].channel_uid, "webhook-uid");
        assert_eq!(sender.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_resolved_group_skips_suppressed_channels() {
        let sender = Arc::new(RecordingSender::default());
        let (dispatcher, _) = Dispatcher::from_configs(&configs(), &deps(sender.clone()));

        let results = dispatcher
            .dispatch_all(&CancellationToken::new(), &single_resolved())
            .await;

        assert_eq!(results[0].outcome, Outcome::Delivered);
        assert_eq!(results[1].outcome, Outcome::Suppressed);
        assert_eq!(sender.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_reported_per_channel() {
        let sender = Arc::new(RecordingSender::failing(DispatchError::Transport(
            "connection refused".to_string(),
        )));
        let (dispatcher, _) = Dispatcher::from_configs(&configs(), &deps(sender));

        let results = dispatcher
            .dispatch_all(&CancellationToken::new(), &single_firing())
            .await;

        assert_eq!(
            results[0].outcome,
            Outcome::Failed("transport error: connection refused".to_string())
        );
        assert!(!results[1].success());
    }

    #[tokio::test]
    async fn test_sends_run_concurrently() {
        let sender = Arc::new(RecordingSender::default().with_delay(Duration::from_millis(200)));
        let (dispatcher, _) = Dispatcher::from_configs(&configs(), &deps(sender));

        let started = std::time::Instant::now();
        dispatcher
            .dispatch_all(&CancellationToken::new(), &single_firing())
            .await;

        assert!(started.elapsed() < Duration::from_millis(390));
    }

    #[test]
    fn test_retain_uid() {
        let (mut dispatcher, _) = Dispatcher::from_configs(
            &configs(),
            &deps(Arc::new(RecordingSender::default())),
        );
        dispatcher.retain_uid("webhook-uid");

        assert_eq!(dispatcher.len(), 1);
        assert_eq!(dispatcher.notifiers()[0].kind(), ChannelKind::Webhook);
    }

    #[test]
    fn test_result_serializes_outcome() {
        let result = NotificationResult {
            channel_uid: "a".to_string(),
            channel_type: ChannelKind::Kafka,
            outcome: Outcome::Failed("boom".to_string()),
            sent_at: Utc::now(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["reason"], "boom");
        assert_eq!(value["channel_type"], "kafka");
    }
}
