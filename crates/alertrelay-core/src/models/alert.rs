//! Alert data models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::alerting::classifier;

/// Label name that identifies the rule an alert came from
pub const ALERT_NAME_LABEL: &str = "alertname";

/// Aggregate or per-alert state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Condition is currently active
    #[default]
    Firing,
    /// Condition has cleared
    Resolved,
}

impl AlertStatus {
    /// Lowercase wire name (`firing` / `resolved`)
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single name/value entry of a [`LabelSet`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pair {
    /// Label or annotation name
    pub name: String,
    /// Label or annotation value
    pub value: String,
}

/// Set of unique key/value pairs used for both labels and annotations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Create an empty label set
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Insert or replace a pair
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no pairs
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pairs sorted by name, except that `alertname` always comes first
    pub fn sorted_pairs(&self) -> Vec<Pair> {
        let mut pairs = Vec::with_capacity(self.0.len());
        if let Some(value) = self.0.get(ALERT_NAME_LABEL) {
            pairs.push(Pair {
                name: ALERT_NAME_LABEL.to_string(),
                value: value.clone(),
            });
        }
        pairs.extend(
            self.0
                .iter()
                .filter(|(name, _)| name.as_str() != ALERT_NAME_LABEL)
                .map(|(name, value)| Pair {
                    name: name.clone(),
                    value: value.clone(),
                }),
        );
        pairs
    }

    /// Names in `sorted_pairs` order
    pub fn names(&self) -> Vec<String> {
        self.sorted_pairs().into_iter().map(|p| p.name).collect()
    }

    /// Values in `sorted_pairs` order
    pub fn values(&self) -> Vec<String> {
        self.sorted_pairs().into_iter().map(|p| p.value).collect()
    }

    /// Copy of this set without the given names
    pub fn without<I, S>(&self, names: I) -> LabelSet
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = self.clone();
        for name in names {
            out.0.remove(name.as_ref());
        }
        out
    }

    /// Iterate pairs in lexical name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One evaluated alert, as produced by rule evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    /// Identifying labels
    #[serde(default)]
    pub labels: LabelSet,

    /// Descriptive annotations
    #[serde(default)]
    pub annotations: LabelSet,

    /// When the alert became active
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,

    /// When the alert stopped (or will stop) being active
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,

    /// Link back to the source of the alert
    #[serde(default, rename = "generatorURL")]
    pub generator_url: Option<String>,
}

impl AlertRecord {
    /// Whether the alert has been resolved as of `now`
    pub fn resolved_at(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|ends_at| ends_at <= now)
    }

    /// Whether the alert has been resolved
    pub fn resolved(&self) -> bool {
        self.resolved_at(Utc::now())
    }

    /// Status as of now
    pub fn status(&self) -> AlertStatus {
        if self.resolved() {
            AlertStatus::Resolved
        } else {
            AlertStatus::Firing
        }
    }

    /// Stable identifier derived from the label set
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in self.labels.iter() {
            hasher.update(name.as_bytes());
            hasher.update([0xff]);
            hasher.update(value.as_bytes());
            hasher.update([0xff]);
        }
        hex::encode(&hasher.finalize()[..8])
    }
}

/// Alerts sharing a grouping key, dispatched together as one notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertGroup {
    /// Grouping key supplied by the caller
    #[serde(default)]
    pub key: String,

    /// Labels the group was formed on
    #[serde(default)]
    pub group_labels: LabelSet,

    /// Member alerts, in input order
    pub alerts: Vec<AlertRecord>,
}

impl AlertGroup {
    /// Create a group from its key, grouping labels and alerts
    pub fn new(key: impl Into<String>, group_labels: LabelSet, alerts: Vec<AlertRecord>) -> Self {
        Self {
            key: key.into(),
            group_labels,
            alerts,
        }
    }

    /// Aggregate status: firing unless every alert is resolved
    pub fn status(&self) -> AlertStatus {
        classifier::aggregate_status(&self.alerts)
    }

    /// Firing members, in input order
    pub fn firing(&self) -> Vec<&AlertRecord> {
        self.alerts.iter().filter(|a| !a.resolved()).collect()
    }

    /// Resolved members, in input order
    pub fn resolved(&self) -> Vec<&AlertRecord> {
        self.alerts.iter().filter(|a| a.resolved()).collect()
    }

    /// Earliest activation time among the firing members
    pub fn earliest_firing_start(&self) -> Option<DateTime<Utc>> {
        classifier::earliest_firing_start(&self.alerts)
    }

    /// Labels shared, with equal values, by every member
    pub fn common_labels(&self) -> LabelSet {
        common_pairs(self.alerts.iter().map(|a| &a.labels))
    }

    /// Annotations shared, with equal values, by every member
    pub fn common_annotations(&self) -> LabelSet {
        common_pairs(self.alerts.iter().map(|a| &a.annotations))
    }
}

fn common_pairs<'a>(mut sets: impl Iterator<Item = &'a LabelSet>) -> LabelSet {
    let Some(first) = sets.next() else {
        return LabelSet::new();
    };
    let mut common = first.clone();
    for set in sets {
        common.0.retain(|name, value| set.get(name) == Some(value.as_str()));
    }
    common
}
