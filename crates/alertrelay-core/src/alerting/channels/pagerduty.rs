//! PagerDuty Events API v2

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{
    finish_render, require, secret, truncate_chars, Notifier, NotifierBase, NotifierDeps,
};
use crate::alerting::dispatch::DispatchRequest;
use crate::alerting::secrets::{Decrypter, Secret};
use crate::alerting::template::{DEFAULT_TITLE, DEFAULT_TITLE_INLINE};
use crate::error::{Result, ValidationError};
use crate::models::{AlertGroup, AlertStatus, Settings};

/// Events v2 enqueue endpoint
pub const PAGERDUTY_EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// Client name reported to PagerDuty
pub const CLIENT_NAME: &str = "AlertRelay";

const SUMMARY_MAX_CHARS: usize = 1024;

const FIRING_DETAILS: &str = "{{#each firing}}{{> __text_alert}}{{/each}}";
const RESOLVED_DETAILS: &str = "{{#each resolved}}{{> __text_alert}}{{/each}}";

/// Triggers and resolves PagerDuty incidents
#[derive(Debug)]
pub struct PagerDutyNotifier {
    base: NotifierBase,
    key: Secret,
    severity: String,
    class: String,
    component: String,
    group: String,
    summary: String,
    deps: NotifierDeps,
}

impl PagerDutyNotifier {
    /// Validate settings: `integrationKey` (secret)
    pub fn new(
        base: NotifierBase,
        settings: Settings<'_>,
        decrypter: &dyn Decrypter,
        deps: NotifierDeps,
    ) -> std::result::Result<Self, ValidationError> {
        let key = secret(settings, decrypter, "integrationKey");
        require(
            key.expose(),
            "Could not find integration key property in settings",
        )?;

        Ok(Self {
            base,
            key,
            severity: settings.str_or("severity", "critical").to_string(),
            class: settings.str("class").to_string(),
            component: settings.str_or("component", CLIENT_NAME).to_string(),
            group: settings.str("group").to_string(),
            summary: settings.str_or("summary", DEFAULT_TITLE_INLINE).to_string(),
            deps,
        })
    }
}

/// Incident dedup key: SHA-256 of the grouping key
pub fn dedup_key(group_key: &str) -> String {
    hex::encode(Sha256::digest(group_key.as_bytes()))
}

fn is_blank(s: &&str) -> bool {
    s.is_empty()
}

#[derive(Debug, Serialize)]
struct PagerDutyMessage<'a> {
    routing_key: &'a str,
    event_action: &'static str,
    dedup_key: String,
    description: String,
    client: &'static str,
    client_url: String,
    payload: PagerDutyPayload<'a>,
    links: Vec<PagerDutyLink>,
}

#[derive(Debug, Serialize)]
struct PagerDutyPayload<'a> {
    summary: String,
    source: &'static str,
    severity: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    class: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    component: &'a str,
    #[serde(skip_serializing_if = "is_blank")]
    group: &'a str,
    custom_details: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
struct PagerDutyLink {
    href: String,
    text: &'static str,
}

#[async_trait]
impl Notifier for PagerDutyNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    #[instrument(skip(self, cancel, group), fields(channel = %self.base.name))]
    async fn notify(&self, cancel: &CancellationToken, group: &AlertGroup) -> Result<bool> {
        let renderer = &self.deps.renderer;
        let data = renderer.data(&self.base.name, group);
        let event_action = match data.status {
            AlertStatus::Firing => "trigger",
            AlertStatus::Resolved => "resolve",
        };
        debug!(event_action, "Sending PagerDuty notification");

        let mut tmpl = renderer.session(&data);
        let description = tmpl.named(DEFAULT_TITLE);
        let summary = tmpl.text(&self.summary);
        let custom_details = BTreeMap::from([
            ("firing", tmpl.text(FIRING_DETAILS)),
            ("resolved", tmpl.text(RESOLVED_DETAILS)),
            ("num_firing", data.firing.len().to_string()),
            ("num_resolved", data.resolved.len().to_string()),
        ]);
        finish_render(&self.base, tmpl)?;

        let external_url = renderer.external_url().to_string();
        let message = PagerDutyMessage {
            routing_key: self.key.expose(),
            event_action,
            dedup_key: dedup_key(&group.key),
            description,
            client: CLIENT_NAME,
            client_url: external_url.clone(),
            payload: PagerDutyPayload {
                summary: truncate_chars(summary, SUMMARY_MAX_CHARS),
                source: CLIENT_NAME,
                severity: &self.severity,
                class: &self.class,
                component: &self.component,
                group: &self.group,
                custom_details,
            },
            links: vec![PagerDutyLink {
                href: external_url,
                text: "External URL",
            }],
        };

        let request = DispatchRequest::post(PAGERDUTY_EVENTS_URL).json(&message)?;
        self.deps.send(&self.base, cancel, request).await
    }
}
