//! Aggregate state of an alert group
//!
//! A group is resolved only when every member is resolved; anything else,
//! including a mix of firing and resolved members, is firing. An empty group
//! has nothing firing and therefore classifies as resolved.

use chrono::{DateTime, Utc};

use crate::models::{AlertRecord, AlertStatus};

/// Aggregate status of a set of alerts
pub fn aggregate_status(alerts: &[AlertRecord]) -> AlertStatus {
    aggregate_status_at(alerts, Utc::now())
}

/// Aggregate status of a set of alerts as of `now`
pub fn aggregate_status_at(alerts: &[AlertRecord], now: DateTime<Utc>) -> AlertStatus {
    if alerts.iter().all(|a| a.resolved_at(now)) {
        AlertStatus::Resolved
    } else {
        AlertStatus::Firing
    }
}

/// Earliest known activation time among firing alerts.
///
/// Alerts without a start time are ignored. Returns `None` for an empty or
/// fully resolved set.
pub fn earliest_firing_start(alerts: &[AlertRecord]) -> Option<DateTime<Utc>> {
    earliest_firing_start_at(alerts, Utc::now())
}

/// [`earliest_firing_start`] evaluated as of `now`
pub fn earliest_firing_start_at(
    alerts: &[AlertRecord],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    alerts
        .iter()
        .filter(|a| !a.resolved_at(now))
        .filter_map(|a| a.starts_at)
        .min()
}

/// Counts and aggregate state of one group, computed in a single pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Aggregate status
    pub status: AlertStatus,
    /// Number of firing members
    pub firing: usize,
    /// Number of resolved members
    pub resolved: usize,
    /// Earliest activation among firing members
    pub earliest_start: Option<DateTime<Utc>>,
}

/// Classify a set of alerts as of `now`
pub fn classify_at(alerts: &[AlertRecord], now: DateTime<Utc>) -> Classification {
    let resolved = alerts.iter().filter(|a| a.resolved_at(now)).count();
    let firing = alerts.len() - resolved;
    Classification {
        status: if firing == 0 {
            AlertStatus::Resolved
        } else {
            AlertStatus::Firing
        },
        firing,
        resolved,
        earliest_start: earliest_firing_start_at(alerts, now),
    }
}

/// Classify a set of alerts as of now
pub fn classify(alerts: &[AlertRecord]) -> Classification {
    classify_at(alerts, Utc::now())
}
