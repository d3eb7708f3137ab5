//! Repository interfaces the aggregation worker depends on.
//!
//! The worker never touches a concrete database handle. It is handed these
//! narrow traits instead, which keeps the aggregation logic testable with
//! in-memory fakes and keeps the store's lifetime owned by whoever opened
//! it. [`worktrail_core::Store`] implements all four.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use worktrail_core::event::AuditEntry;
use worktrail_core::model::{PerformanceSnapshot, Period, Task};
use worktrail_core::store::Store;

/// Live task state for a workspace.
pub trait TaskSource {
    /// All tasks in the workspace, active and inactive.
    ///
    /// # Errors
    ///
    /// Fails when the underlying store fails.
    fn workspace_tasks(&self, workspace_id: &str) -> Result<Vec<Task>>;

    /// Distinct assignee ids among the workspace's active tasks.
    ///
    /// # Errors
    ///
    /// Fails when the underlying store fails.
    fn workspace_assignees(&self, workspace_id: &str) -> Result<Vec<String>>;
}

/// Read access to one entity's audit trail.
pub trait TrailSource {
    /// The entity's full trail, oldest first.
    ///
    /// # Errors
    ///
    /// Fails when the underlying store fails.
    fn entity_trail(&self, entity_id: &str) -> Result<Vec<AuditEntry>>;
}

/// Write and query access to aggregation output.
pub trait SnapshotStore {
    /// Persist one snapshot. Snapshots are insert-only.
    ///
    /// # Errors
    ///
    /// Fails when the underlying store fails.
    fn insert(&self, snapshot: &PerformanceSnapshot) -> Result<()>;

    /// The snapshot immediately preceding `date` for (user, period), if any.
    ///
    /// # Errors
    ///
    /// Fails when the underlying store fails.
    fn latest_before(
        &self,
        user_id: &str,
        period: Period,
        date: DateTime<Utc>,
    ) -> Result<Option<PerformanceSnapshot>>;

    /// Snapshots for (user, period) within a date range, newest first,
    /// superseded writes filtered out.
    ///
    /// # Errors
    ///
    /// Fails when the underlying store fails.
    fn for_user(
        &self,
        user_id: &str,
        period: Period,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PerformanceSnapshot>>;

    /// Latest snapshot per user in the workspace for one period.
    ///
    /// # Errors
    ///
    /// Fails when the underlying store fails.
    fn latest_for_workspace(
        &self,
        workspace_id: &str,
        period: Period,
    ) -> Result<Vec<PerformanceSnapshot>>;
}

/// Mutual exclusion for aggregation runs, keyed on the full window tuple.
pub trait RunLock {
    /// Try to claim (workspace, period, window). `false` means another run
    /// holds it.
    ///
    /// # Errors
    ///
    /// Fails when the underlying store fails.
    fn try_begin(
        &self,
        workspace_id: &str,
        period: Period,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Release the claim. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails when the underlying store fails.
    fn finish(
        &self,
        workspace_id: &str,
        period: Period,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<()>;
}

impl TaskSource for Store {
    fn workspace_tasks(&self, workspace_id: &str) -> Result<Vec<Task>> {
        self.tasks_in_workspace(workspace_id)
            .with_context(|| format!("load tasks for workspace {workspace_id}"))
    }

    fn workspace_assignees(&self, workspace_id: &str) -> Result<Vec<String>> {
        self.assignees_in_workspace(workspace_id)
            .with_context(|| format!("load assignees for workspace {workspace_id}"))
    }
}

impl TrailSource for Store {
    fn entity_trail(&self, entity_id: &str) -> Result<Vec<AuditEntry>> {
        self.trail_for_entity(entity_id)
            .with_context(|| format!("load trail for {entity_id}"))
    }
}

impl SnapshotStore for Store {
    fn insert(&self, snapshot: &PerformanceSnapshot) -> Result<()> {
        self.insert_snapshot(snapshot)
            .with_context(|| format!("insert snapshot {}", snapshot.snapshot_id))
    }

    fn latest_before(
        &self,
        user_id: &str,
        period: Period,
        date: DateTime<Utc>,
    ) -> Result<Option<PerformanceSnapshot>> {
        self.latest_snapshot_before(user_id, period, date)
            .with_context(|| format!("load prior snapshot for {user_id}"))
    }

    fn for_user(
        &self,
        user_id: &str,
        period: Period,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PerformanceSnapshot>> {
        self.snapshots_for_user(user_id, period, from, to)
            .with_context(|| format!("load snapshots for {user_id}"))
    }

    fn latest_for_workspace(
        &self,
        workspace_id: &str,
        period: Period,
    ) -> Result<Vec<PerformanceSnapshot>> {
        self.latest_workspace_snapshots(workspace_id, period)
            .with_context(|| format!("load workspace snapshots for {workspace_id}"))
    }
}

impl RunLock for Store {
    fn try_begin(
        &self,
        workspace_id: &str,
        period: Period,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.try_begin_run(workspace_id, period, window_start, window_end, now)
            .with_context(|| format!("claim aggregation run for {workspace_id}"))
    }

    fn finish(
        &self,
        workspace_id: &str,
        period: Period,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<()> {
        self.finish_run(workspace_id, period, window_start, window_end)
            .with_context(|| format!("release aggregation run for {workspace_id}"))
    }
}
