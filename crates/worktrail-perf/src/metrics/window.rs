//! One user's raw metrics over an aggregation window.
//!
//! Counts split two ways: status buckets are point-in-time over the user's
//! live tasks, while completion/approval outcomes are scoped to the window.
//! Rejection history comes from each task's audit trail, so rework from a
//! cycle that predates the current task row still counts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use worktrail_core::event::{DomainEvent, TaskEvent};
use worktrail_core::model::{ApprovalStatus, PerformanceMetrics, ProjectBreakdown, Status, Task};

use crate::repo::TrailSource;

/// Aggregation window bounds, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UserWindow {
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    /// Window span in days, floored at 1 so velocity never divides by zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn days(&self) -> f64 {
        let days = (self.end - self.start).num_days();
        days.max(1) as f64
    }
}

/// Everything the scorer needs for one user, before cohort normalization.
///
/// `velocity_normalized` and `productivity_score` stay zero here; they
/// depend on the whole cohort and are filled in by the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMetrics {
    pub user_id: String,
    pub metrics: PerformanceMetrics,
    pub projects: Vec<ProjectBreakdown>,
}

impl WindowMetrics {
    /// Derive one user's window metrics from their tasks and trails.
    ///
    /// # Errors
    ///
    /// Fails when a trail lookup fails.
    pub fn derive(
        user_id: &str,
        tasks: &[&Task],
        trail: &dyn TrailSource,
        window: UserWindow,
    ) -> Result<Self> {
        let mut out = PerformanceMetrics::default();
        let mut projects: Vec<ProjectBreakdown> = Vec::new();
        let mut completed_hours = 0.0f64;
        let mut on_time = 0u32;
        let mut first_time_approved = 0u32;
        let mut reworked = 0u32;
        let mut rejected_in_window = 0u32;

        for task in tasks {
            if !task.is_active {
                continue;
            }
            out.tasks_assigned = out.tasks_assigned.saturating_add(1);
            breakdown_for(&mut projects, &task.project_id).tasks_assigned += 1;

            match task.status {
                Status::ToDo => out.tasks_todo = out.tasks_todo.saturating_add(1),
                Status::InProgress => {
                    out.tasks_in_progress = out.tasks_in_progress.saturating_add(1);
                }
                Status::Done => {}
            }
            if task.approval_status == ApprovalStatus::PendingApproval {
                out.tasks_pending_approval = out.tasks_pending_approval.saturating_add(1);
            }
            out.total_working_hours += task.metrics.total_working_hours;

            let history = trail.entity_trail(&task.id)?;
            let rejections_before_end = history
                .iter()
                .filter(|e| {
                    e.event == DomainEvent::Task(TaskEvent::Rejected) && e.timestamp <= window.end
                })
                .count();
            rejected_in_window = rejected_in_window.saturating_add(
                u32::try_from(
                    history
                        .iter()
                        .filter(|e| {
                            e.event == DomainEvent::Task(TaskEvent::Rejected)
                                && window.contains(e.timestamp)
                        })
                        .count(),
                )
                .unwrap_or(u32::MAX),
            );

            if let Some(completed_at) = task.completed_at
                && window.contains(completed_at)
            {
                out.tasks_completed = out.tasks_completed.saturating_add(1);
                breakdown_for(&mut projects, &task.project_id).tasks_completed += 1;
                completed_hours += hours_between(task.created_at, completed_at);
                if task.due_date.is_none_or(|due| completed_at <= due) {
                    on_time = on_time.saturating_add(1);
                }
                if rejections_before_end > 0 {
                    reworked = reworked.saturating_add(1);
                }
            }

            if let Some(approved_at) = task.approved_at
                && window.contains(approved_at)
            {
                out.tasks_approved = out.tasks_approved.saturating_add(1);
                if rejections_before_end == 0 {
                    first_time_approved = first_time_approved.saturating_add(1);
                }
            }
        }

        out.tasks_rejected = rejected_in_window;
        out.approval_rate = rate(out.tasks_approved, out.tasks_approved + out.tasks_rejected);
        out.first_time_approval_rate = rate(first_time_approved, out.tasks_completed);
        out.on_time_completion_rate = rate(on_time, out.tasks_completed);
        out.rework_rate = rate(reworked, out.tasks_completed);
        out.avg_completion_hours = if out.tasks_completed == 0 {
            0.0
        } else {
            round2(completed_hours / f64::from(out.tasks_completed))
        };
        out.velocity = f64::from(out.tasks_completed) / window.days();
        out.quality_score = (100.0 - out.rework_rate).clamp(0.0, 100.0);

        Ok(Self {
            user_id: user_id.to_string(),
            metrics: out,
            projects,
        })
    }
}

fn breakdown_for<'a>(
    projects: &'a mut Vec<ProjectBreakdown>,
    project_id: &str,
) -> &'a mut ProjectBreakdown {
    if let Some(index) = projects.iter().position(|p| p.project_id == project_id) {
        return &mut projects[index];
    }
    projects.push(ProjectBreakdown {
        project_id: project_id.to_string(),
        tasks_assigned: 0,
        tasks_completed: 0,
    });
    let last = projects.len() - 1;
    &mut projects[last]
}

/// Percentage on a 0-100 scale; 0 when the denominator is 0.
fn rate(numerator: u32, denominator: u32) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round2(f64::from(numerator) / f64::from(denominator) * 100.0)
}

#[allow(clippy::cast_precision_loss)]
fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 3600.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
