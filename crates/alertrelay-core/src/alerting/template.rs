//! Message templating
//!
//! Templates are handlebars sources executed against a [`TemplateData`]
//! context built from one alert group. Built-in fragments are registered
//! under `default.title` and `default.message`; channel settings may carry
//! inline templates that include them as partials (`{{> default.message}}`).
//!
//! Rendering goes through a [`RenderSession`], which keeps the first failing
//! fragment instead of aborting, so a notifier can assemble every fragment it
//! needs and then decide once whether the message is usable.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use handlebars::{handlebars_helper, Handlebars};
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::classifier;
use crate::error::{Error, Result, TemplateError};
use crate::models::{AlertGroup, AlertRecord, AlertStatus, Pair};

/// Name of the built-in title template
pub const DEFAULT_TITLE: &str = "default.title";

/// Name of the built-in message template
pub const DEFAULT_MESSAGE: &str = "default.message";

/// Inline source rendering [`DEFAULT_TITLE`]
pub const DEFAULT_TITLE_INLINE: &str = "{{> default.title}}";

/// Inline source rendering [`DEFAULT_MESSAGE`]
pub const DEFAULT_MESSAGE_INLINE: &str = "{{> default.message}}";

// Block tags never sit alone on a line: handlebars strips standalone lines,
// and the newline layout below is part of every channel's wire format.
const TITLE_SOURCE: &str = concat!(
    "[{{upper status}}{{#if firing}}:{{len firing}}{{/if}}] ",
    "{{join group_label_values \" \"}} ",
    "{{#if extra_common_label_values}}({{join extra_common_label_values \" \"}}){{/if}}",
);

const ALERT_SOURCE: &str = concat!(
    "Labels:\n",
    "{{#each labels}} - {{name}} = {{value}}\n{{/each}}",
    "Annotations:\n",
    "{{#each annotations}} - {{name}} = {{value}}\n{{/each}}",
    "Source: {{generator_url}}\n",
);

const MESSAGE_SOURCE: &str = concat!(
    "\n{{#if firing}}**Firing**\n{{#each firing}}{{> __text_alert}}{{/each}}{{/if}}\n\n",
    "{{#if resolved}}**Resolved**\n{{#each resolved}}{{> __text_alert}}{{/each}}{{/if}}\n\n",
);

const INLINE_FRAGMENT: &str = "inline";

handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(join: |items: array, sep: str| {
    items
        .iter()
        .map(|item| match item.as_str() {
            Some(s) => s.to_string(),
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(sep)
});

/// One alert as seen by templates
#[derive(Debug, Clone, Serialize)]
pub struct TemplateAlert {
    /// `firing` or `resolved`
    pub status: AlertStatus,
    /// Labels, `alertname` first
    pub labels: Vec<Pair>,
    /// Annotations in name order
    pub annotations: Vec<Pair>,
    /// RFC 3339 activation time, if known
    pub starts_at: Option<String>,
    /// RFC 3339 end time, if known
    pub ends_at: Option<String>,
    /// Link to the alert source, or empty
    pub generator_url: String,
    /// Label-derived identifier
    pub fingerprint: String,
}

impl TemplateAlert {
    fn new(alert: &AlertRecord, now: DateTime<Utc>) -> Self {
        Self {
            status: if alert.resolved_at(now) {
                AlertStatus::Resolved
            } else {
                AlertStatus::Firing
            },
            labels: alert.labels.sorted_pairs(),
            annotations: alert.annotations.sorted_pairs(),
            starts_at: alert.starts_at.map(rfc3339),
            ends_at: alert.ends_at.map(rfc3339),
            generator_url: alert.generator_url.clone().unwrap_or_default(),
            fingerprint: alert.fingerprint(),
        }
    }
}

/// Context exposed to templates for one alert group
#[derive(Debug, Clone, Serialize)]
pub struct TemplateData {
    /// Name of the channel being notified
    pub receiver: String,
    /// Aggregate status of the group
    pub status: AlertStatus,
    /// Every member, in input order
    pub alerts: Vec<TemplateAlert>,
    /// Firing members
    pub firing: Vec<TemplateAlert>,
    /// Resolved members
    pub resolved: Vec<TemplateAlert>,
    /// Labels the group was formed on
    pub group_labels: Vec<Pair>,
    /// Labels shared by every member
    pub common_labels: Vec<Pair>,
    /// Annotations shared by every member
    pub common_annotations: Vec<Pair>,
    /// Values of `group_labels`
    pub group_label_values: Vec<String>,
    /// Values of common labels that are not group labels; only populated when
    /// the group has more common labels than grouping labels
    pub extra_common_label_values: Vec<String>,
    /// Base URL of the alerting UI
    pub external_url: String,
    /// Grouping key
    pub group_key: String,
}

impl TemplateData {
    /// Snapshot `group` as of `now`
    pub fn new(receiver: &str, group: &AlertGroup, external_url: &Url, now: DateTime<Utc>) -> Self {
        let alerts: Vec<TemplateAlert> = group
            .alerts
            .iter()
            .map(|a| TemplateAlert::new(a, now))
            .collect();
        let (resolved, firing): (Vec<_>, Vec<_>) = alerts
            .iter()
            .cloned()
            .partition(|a| a.status == AlertStatus::Resolved);

        let common_labels = group.common_labels();
        let extra_common_label_values = if common_labels.len() > group.group_labels.len() {
            common_labels
                .without(group.group_labels.names())
                .values()
        } else {
            Vec::new()
        };

        Self {
            receiver: receiver.to_string(),
            status: classifier::aggregate_status_at(&group.alerts, now),
            alerts,
            firing,
            resolved,
            group_labels: group.group_labels.sorted_pairs(),
            common_labels: common_labels.sorted_pairs(),
            common_annotations: group.common_annotations().sorted_pairs(),
            group_label_values: group.group_labels.values(),
            extra_common_label_values,
            external_url: external_url.to_string(),
            group_key: group.key.clone(),
        }
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Compiled template registry shared by every notifier
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
    external_url: Url,
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer")
            .field("external_url", &self.external_url.as_str())
            .finish_non_exhaustive()
    }
}

impl TemplateRenderer {
    /// Create a renderer with the built-in templates registered
    pub fn new(external_url: &str) -> Result<Self> {
        let external_url = Url::parse(external_url)
            .map_err(|e| Error::config(format!("invalid external URL {external_url:?}: {e}")))?;

        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.register_helper("upper", Box::new(upper));
        registry.register_helper("join", Box::new(join));

        let mut renderer = Self {
            registry,
            external_url,
        };
        renderer.register_template("__text_alert", ALERT_SOURCE)?;
        renderer.register_template(DEFAULT_TITLE, TITLE_SOURCE)?;
        renderer.register_template(DEFAULT_MESSAGE, MESSAGE_SOURCE)?;
        Ok(renderer)
    }

    /// Register (or replace) a named template
    pub fn register_template(&mut self, name: &str, source: &str) -> Result<()> {
        self.registry
            .register_template_string(name, source)
            .map_err(|e| {
                Error::from(TemplateError {
                    fragment: name.to_string(),
                    message: e.to_string(),
                })
            })
    }

    /// Register a template file under its file name, minus any `.hbs` suffix
    pub fn register_template_file(&mut self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::config(format!("invalid template path {}", path.display())))?;
        let name = file_name.strip_suffix(".hbs").unwrap_or(file_name);
        let source = std::fs::read_to_string(path)?;

        debug!(template = name, path = %path.display(), "Registering template file");
        self.register_template(name, &source)
    }

    /// Whether a template is registered under `name`
    pub fn has_template(&self, name: &str) -> bool {
        self.registry.has_template(name)
    }

    /// Base URL of the alerting UI
    pub fn external_url(&self) -> &Url {
        &self.external_url
    }

    /// Link to the alert rule list
    pub fn rule_url(&self) -> String {
        format!(
            "{}/alerting/list",
            self.external_url.as_str().trim_end_matches('/')
        )
    }

    /// Build the template context for `group` as seen by `receiver`
    pub fn data(&self, receiver: &str, group: &AlertGroup) -> TemplateData {
        TemplateData::new(receiver, group, &self.external_url, Utc::now())
    }

    /// Start a call-scoped render session over `data`
    pub fn session<'a>(&'a self, data: &'a TemplateData) -> RenderSession<'a> {
        RenderSession {
            renderer: self,
            data,
            errors: Vec::new(),
        }
    }
}

/// Renders fragments for one notification, collecting failures.
///
/// Each failed fragment renders as an empty string. Errors are reported by
/// [`RenderSession::finish`] once every fragment has been attempted.
pub struct RenderSession<'a> {
    renderer: &'a TemplateRenderer,
    data: &'a TemplateData,
    errors: Vec<TemplateError>,
}

impl RenderSession<'_> {
    /// Render a registered template by name
    pub fn named(&mut self, name: &str) -> String {
        match self.renderer.registry.render(name, self.data) {
            Ok(out) => out,
            Err(e) => {
                self.errors.push(TemplateError {
                    fragment: name.to_string(),
                    message: e.to_string(),
                });
                String::new()
            }
        }
    }

    /// Render an inline template source, typically taken from channel settings
    pub fn text(&mut self, source: &str) -> String {
        match self.renderer.registry.render_template(source, self.data) {
            Ok(out) => out,
            Err(e) => {
                self.errors.push(TemplateError {
                    fragment: INLINE_FRAGMENT.to_string(),
                    message: e.to_string(),
                });
                String::new()
            }
        }
    }

    /// Every failure recorded so far, in render order
    pub fn errors(&self) -> &[TemplateError] {
        &self.errors
    }

    /// Close the session, reporting the first failure if any
    pub fn finish(self) -> std::result::Result<(), TemplateError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
