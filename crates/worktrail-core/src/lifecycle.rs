//! Lifecycle metrics derived from a task and its audit trail.
//!
//! Durations come from the task's own timestamps; rework counts come from
//! the trail, so a rejection that happened before the current cycle still
//! counts even though the task row only carries the latest state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{AuditEntry, DomainEvent, TaskEvent};
use crate::model::Task;

/// Summary statistics over one task's full history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifecycleMetrics {
    /// Hours from creation to completion. Zero until `completed_at` is set.
    pub total_duration_hours: f64,
    /// Hours from start to completion. Zero if either endpoint is missing.
    pub working_duration_hours: f64,
    pub rejection_count: u32,
    pub approval_attempts: u32,
    pub reassignments: u32,
    /// Set when a duration came out negative and was clamped. Bad data,
    /// not an error.
    pub anomaly: bool,
}

impl LifecycleMetrics {
    /// Compute metrics from the task row and its trail.
    ///
    /// The trail may be in any order; only event counts are read from it.
    #[must_use]
    pub fn compute(task: &Task, trail: &[AuditEntry]) -> Self {
        let mut anomaly = false;
        let total = clamped_hours(Some(task.created_at), task.completed_at, &mut anomaly);
        let working = clamped_hours(task.started_at, task.completed_at, &mut anomaly);

        let mut rejection_count = 0u32;
        let mut approval_attempts = 0u32;
        let mut reassignments = 0u32;
        for entry in trail {
            match entry.event {
                DomainEvent::Task(TaskEvent::Rejected) => {
                    rejection_count = rejection_count.saturating_add(1);
                }
                DomainEvent::Task(TaskEvent::SubmittedForApproval) => {
                    approval_attempts = approval_attempts.saturating_add(1);
                }
                DomainEvent::Task(TaskEvent::Reassigned) => {
                    reassignments = reassignments.saturating_add(1);
                }
                _ => {}
            }
        }

        Self {
            total_duration_hours: total,
            working_duration_hours: working,
            rejection_count,
            approval_attempts,
            reassignments,
            anomaly,
        }
    }
}

/// Hours between two optional endpoints, rounded to 2 decimals. A negative
/// spread clamps to 0 and trips the anomaly flag.
#[allow(clippy::cast_precision_loss)]
fn clamped_hours(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    anomaly: &mut bool,
) -> f64 {
    let (Some(start), Some(end)) = (start, end) else {
        return 0.0;
    };
    let hours = (end - start).num_seconds() as f64 / 3600.0;
    if hours < 0.0 {
        *anomaly = true;
        return 0.0;
    }
    round2(hours)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
