//! The aggregation worker.
//!
//! One run covers one (workspace, period, window) tuple: derive every
//! assignee's window metrics, normalize velocity across the cohort, score,
//! rank, diff against each user's prior snapshot for trends, and persist
//! one immutable snapshot per user. A run-lock on the tuple keeps a
//! concurrently scheduled duplicate out; the duplicate is rejected, not
//! queued.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};
use worktrail_core::config::ScoringConfig;
use worktrail_core::error::ErrorCode;
use worktrail_core::model::{PerformanceMetrics, PerformanceSnapshot, Period, Rankings, Task};
use worktrail_core::store::{Pagination, Store};

use crate::metrics::{UserWindow, WindowMetrics, trends_against};
use crate::rank::rank_users;
use crate::repo::{RunLock, SnapshotStore, TaskSource, TrailSource};
use crate::score::{ScoreInputs, composite_score, normalize_metric};

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error(
        "aggregation already running for workspace {workspace_id} ({period}, {window_start}..{window_end})"
    )]
    RunConflict {
        workspace_id: String,
        period: Period,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },
    #[error("invalid aggregation window: start {start} is not before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error(transparent)]
    Source(#[from] anyhow::Error),
}

impl AggregationError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::RunConflict { .. } => ErrorCode::AggregationRunConflict,
            Self::InvalidWindow { .. } => ErrorCode::ValidationFailed,
            Self::Source(_) => ErrorCode::InternalUnexpected,
        }
    }
}

/// Sort key for the employee list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    ProductivityScore,
    ApprovalRate,
    TasksCompleted,
    Velocity,
    UserId,
}

impl SortBy {
    fn key(self, snapshot: &PerformanceSnapshot) -> f64 {
        match self {
            Self::ProductivityScore => snapshot.metrics.productivity_score,
            Self::ApprovalRate => snapshot.metrics.approval_rate,
            Self::TasksCompleted => f64::from(snapshot.metrics.tasks_completed),
            Self::Velocity => snapshot.metrics.velocity,
            Self::UserId => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// One row of the employee list.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeSummary {
    pub user_id: String,
    pub snapshot_date: DateTime<Utc>,
    pub metrics: PerformanceMetrics,
    pub rankings: Rankings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeList {
    pub employees: Vec<EmployeeSummary>,
    pub pagination: Pagination,
}

/// Aggregation entry point, wired to the repositories it reads and writes.
pub struct Aggregator<'a> {
    tasks: &'a dyn TaskSource,
    trail: &'a dyn TrailSource,
    snapshots: &'a dyn SnapshotStore,
    runs: &'a dyn RunLock,
    scoring: ScoringConfig,
}

impl<'a> Aggregator<'a> {
    #[must_use]
    pub fn new(
        tasks: &'a dyn TaskSource,
        trail: &'a dyn TrailSource,
        snapshots: &'a dyn SnapshotStore,
        runs: &'a dyn RunLock,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            tasks,
            trail,
            snapshots,
            runs,
            scoring,
        }
    }

    /// Wire every repository to the same core store.
    #[must_use]
    pub fn over_store(store: &'a Store, scoring: ScoringConfig) -> Self {
        Self::new(store, store, store, store, scoring)
    }

    /// Run aggregation for (workspace, period, window) and persist one
    /// snapshot per assignee. Returns the snapshots in rank order.
    ///
    /// # Errors
    ///
    /// [`AggregationError::RunConflict`] when the window is already being
    /// aggregated, [`AggregationError::InvalidWindow`] for a backwards
    /// window, or a repository failure.
    pub fn run_aggregation(
        &self,
        workspace_id: &str,
        period: Period,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PerformanceSnapshot>, AggregationError> {
        if window_start >= window_end {
            return Err(AggregationError::InvalidWindow {
                start: window_start,
                end: window_end,
            });
        }

        let claimed = self
            .runs
            .try_begin(workspace_id, period, window_start, window_end, now)?;
        if !claimed {
            warn!(workspace_id, %period, "aggregation run already in flight");
            return Err(AggregationError::RunConflict {
                workspace_id: workspace_id.to_string(),
                period,
                window_start,
                window_end,
            });
        }

        let result = self.aggregate_window(workspace_id, period, window_start, window_end, now);
        // Release the claim even when aggregation failed partway.
        let released = self.runs.finish(workspace_id, period, window_start, window_end);
        if let Err(error) = released {
            warn!(workspace_id, %error, "failed to release aggregation run-lock");
        }
        result
    }

    fn aggregate_window(
        &self,
        workspace_id: &str,
        period: Period,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PerformanceSnapshot>, AggregationError> {
        let window = UserWindow {
            start: window_start,
            end: window_end,
        };
        let all_tasks = self.tasks.workspace_tasks(workspace_id)?;
        let assignees = self.tasks.workspace_assignees(workspace_id)?;
        debug!(
            workspace_id,
            tasks = all_tasks.len(),
            users = assignees.len(),
            "aggregating window"
        );

        let mut per_user = Vec::with_capacity(assignees.len());
        for user_id in &assignees {
            let owned: Vec<&Task> = all_tasks
                .iter()
                .filter(|t| t.assignee.as_deref() == Some(user_id))
                .collect();
            per_user.push(WindowMetrics::derive(user_id, &owned, self.trail, window)?);
        }

        let velocities: Vec<f64> = per_user.iter().map(|u| u.metrics.velocity).collect();
        let normalized = normalize_metric(&velocities);
        for (user, velocity_normalized) in per_user.iter_mut().zip(normalized) {
            user.metrics.velocity_normalized = velocity_normalized;
            user.metrics.productivity_score = composite_score(
                &ScoreInputs {
                    approval_rate: user.metrics.approval_rate,
                    on_time_rate: user.metrics.on_time_completion_rate,
                    velocity_normalized,
                    quality_score: user.metrics.quality_score,
                },
                &self.scoring,
            );
        }

        let scores: Vec<(String, f64)> = per_user
            .iter()
            .map(|u| (u.user_id.clone(), u.metrics.productivity_score))
            .collect();
        let ranked = rank_users(&scores);

        let mut written = Vec::with_capacity(ranked.len());
        for (user_id, rankings) in ranked {
            let Some(user) = per_user.iter().find(|u| u.user_id == user_id) else {
                continue;
            };
            let prior = self.snapshots.latest_before(&user_id, period, window_end)?;
            let trends = prior.map(|p| trends_against(&user.metrics, &p.metrics));

            let snapshot = PerformanceSnapshot {
                snapshot_id: PerformanceSnapshot::derive_id(&user_id, period, window_end, now),
                user_id: user_id.clone(),
                workspace_id: workspace_id.to_string(),
                period,
                snapshot_date: window_end,
                metrics: user.metrics,
                projects: user.projects.clone(),
                rankings,
                trends,
                created_at: now,
            };
            self.snapshots.insert(&snapshot)?;
            written.push(snapshot);
        }

        info!(
            workspace_id,
            %period,
            snapshots = written.len(),
            "aggregation run complete"
        );
        Ok(written)
    }

    /// Snapshots for one user over a date range, newest first.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot store fails.
    pub fn get_performance(
        &self,
        user_id: &str,
        period: Period,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PerformanceSnapshot>, AggregationError> {
        Ok(self.snapshots.for_user(user_id, period, from, to)?)
    }

    /// One page of the workspace's employees with their latest snapshot for
    /// `period`, sorted by the requested key.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot store fails.
    pub fn get_employee_list(
        &self,
        workspace_id: &str,
        period: Period,
        sort_by: SortBy,
        order: SortOrder,
        page: u32,
        limit: u32,
    ) -> Result<EmployeeList, AggregationError> {
        let mut latest = self.snapshots.latest_for_workspace(workspace_id, period)?;

        latest.sort_by(|a, b| {
            let ordering = if sort_by == SortBy::UserId {
                a.user_id.cmp(&b.user_id)
            } else {
                sort_by
                    .key(a)
                    .partial_cmp(&sort_by.key(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.user_id.cmp(&b.user_id))
            };
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = u64::try_from(latest.len()).unwrap_or(u64::MAX);
        let page = page.max(1);
        let limit = limit.max(1);
        let page_len = usize::try_from(limit).unwrap_or(usize::MAX);
        let offset = usize::try_from(page - 1)
            .unwrap_or(usize::MAX)
            .saturating_mul(page_len);
        let employees = latest
            .into_iter()
            .skip(offset)
            .take(page_len)
            .map(|snapshot| EmployeeSummary {
                user_id: snapshot.user_id.clone(),
                snapshot_date: snapshot.snapshot_date,
                metrics: snapshot.metrics,
                rankings: snapshot.rankings,
            })
            .collect();

        Ok(EmployeeList {
            employees,
            pagination: Pagination::for_total(page, limit, total),
        })
    }
}
