//! Per-employee performance snapshots produced by the aggregation worker.
//!
//! Snapshots are immutable once written. Re-running aggregation for the same
//! (user, period, date) writes a new snapshot that supersedes the prior one;
//! reads always pick the latest write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, str::FromStr};

/// Aggregation cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = crate::model::task::ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(crate::model::task::ParseEnumError {
                expected: "period",
                got: s.to_string(),
            }),
        }
    }
}

/// The 17 derived metrics of one snapshot.
///
/// Counts are window-scoped; rates are percentages on a 0-100 scale;
/// `productivity_score` is the weighted composite of the rate metrics, clamped to [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PerformanceMetrics {
    pub tasks_assigned: u32,
    pub tasks_completed: u32,
    pub tasks_in_progress: u32,
    pub tasks_todo: u32,
    pub tasks_approved: u32,
    pub tasks_rejected: u32,
    pub tasks_pending_approval: u32,
    pub approval_rate: f64,
    pub first_time_approval_rate: f64,
    pub on_time_completion_rate: f64,
    pub rework_rate: f64,
    pub avg_completion_hours: f64,
    pub total_working_hours: f64,
    pub velocity: f64,
    pub velocity_normalized: f64,
    pub quality_score: f64,
    pub productivity_score: f64,
}

impl PerformanceMetrics {
    /// Metric values keyed by name, in stable order. The trend calculator
    /// diffs snapshots through this view.
    #[must_use]
    pub fn named(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("tasks_assigned", f64::from(self.tasks_assigned)),
            ("tasks_completed", f64::from(self.tasks_completed)),
            ("tasks_in_progress", f64::from(self.tasks_in_progress)),
            ("tasks_todo", f64::from(self.tasks_todo)),
            ("tasks_approved", f64::from(self.tasks_approved)),
            ("tasks_rejected", f64::from(self.tasks_rejected)),
            ("tasks_pending_approval", f64::from(self.tasks_pending_approval)),
            ("approval_rate", self.approval_rate),
            ("first_time_approval_rate", self.first_time_approval_rate),
            ("on_time_completion_rate", self.on_time_completion_rate),
            ("rework_rate", self.rework_rate),
            ("avg_completion_hours", self.avg_completion_hours),
            ("total_working_hours", self.total_working_hours),
            ("velocity", self.velocity),
            ("velocity_normalized", self.velocity_normalized),
            ("quality_score", self.quality_score),
            ("productivity_score", self.productivity_score),
        ])
    }
}

/// Per-project contribution inside one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectBreakdown {
    pub project_id: String,
    pub tasks_assigned: u32,
    pub tasks_completed: u32,
}

/// Standing among workspace peers for the snapshot's period.
///
/// `percentile` is 0 for the best performer and 100 for the worst; a
/// single-member workspace is pinned to 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rankings {
    pub rank: u32,
    pub percentile: f64,
    pub total_in_workspace: u32,
}

/// Percent delta of each tracked metric against the immediately preceding
/// snapshot of the same (user, period). Missing for a user's first snapshot.
pub type Trends = BTreeMap<String, f64>;

/// One immutable aggregation result for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub snapshot_id: String,
    pub user_id: String,
    pub workspace_id: String,
    pub period: Period,
    pub snapshot_date: DateTime<Utc>,
    pub metrics: PerformanceMetrics,
    pub projects: Vec<ProjectBreakdown>,
    pub rankings: Rankings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trends: Option<Trends>,
    pub created_at: DateTime<Utc>,
}

impl PerformanceSnapshot {
    /// Derive the snapshot's identity from its coordinates and write time.
    /// Runs over the same (user, period, date) at different write times get
    /// distinct ids and the newer row supersedes; a rerun that shares a
    /// write time reproduces the same id and replaces its own row.
    #[must_use]
    pub fn derive_id(
        user_id: &str,
        period: Period,
        snapshot_date: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> String {
        let input = format!(
            "{user_id}\t{period}\t{}\t{}",
            snapshot_date.timestamp_micros(),
            created_at.timestamp_micros()
        );
        format!("snap-{}", &blake3::hash(input.as_bytes()).to_hex()[..16])
    }
}
