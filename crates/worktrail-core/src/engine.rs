//! Facade the outer layers (HTTP service, schedulers) talk to.
//!
//! Owns the store handle and the engine configuration; every operation the
//! engine offers to a collaborator goes through here rather than through
//! module internals.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::classify::{ProjectImage, TaskImage, delay_days};
use crate::config::EngineConfig;
use crate::error::WorkflowError;
use crate::event::AuditEntry;
use crate::intercept::{MutationContext, record_project_mutation, record_task_mutation};
use crate::lifecycle::LifecycleMetrics;
use crate::model::{DateChange, DateField, Project, Task};
use crate::store::{Pagination, Store};
use crate::workflow::{self, Actor, ReassignRequest, RejectRequest};

/// One task's timeline page plus its derived metrics.
#[derive(Debug, Clone, Serialize)]
pub struct Lifecycle {
    pub timeline: Vec<AuditEntry>,
    pub metrics: LifecycleMetrics,
    pub pagination: Pagination,
}

/// A project's date-change log with totals.
#[derive(Debug, Clone, Serialize)]
pub struct DateChangeReport {
    pub date_changes: Vec<DateChange>,
    pub summary: DateChangeSummary,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DateChangeSummary {
    pub total_extensions: u32,
    pub total_delay_days: i64,
}

pub struct Engine {
    store: Store,
    config: EngineConfig,
}

impl Engine {
    /// Open (creating if needed) the store at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or migrated.
    pub fn open(path: &Path, config: EngineConfig) -> Result<Self> {
        let store = Store::open(path)
            .with_context(|| format!("open engine store at {}", path.display()))?;
        Ok(Self { store, config })
    }

    #[must_use]
    pub fn with_store(store: Store, config: EngineConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one retention sweep pass with the configured window and batch
    /// size. `cancel` may be flipped from another thread; the sweep stops
    /// between batches and leaves a valid partial state.
    ///
    /// # Errors
    ///
    /// Fails when a delete batch fails.
    pub fn sweep_audit(
        &self,
        now: DateTime<Utc>,
        cancel: &std::sync::atomic::AtomicBool,
    ) -> Result<crate::store::SweepOutcome> {
        self.store.sweep_expired(
            now,
            self.config.audit.retention_days,
            self.config.audit.sweep_batch_size,
            cancel,
        )
    }

    /// Record a task mutation performed outside the workflow machine
    /// (create, edit, delete). Fire-and-forget: classification misses and
    /// audit-store failures never surface.
    pub fn record_task_mutation(
        &self,
        task_id: &str,
        context: &MutationContext,
        pre: Option<&TaskImage>,
        post: &TaskImage,
    ) {
        record_task_mutation(&self.store, task_id, context, pre, post);
    }

    /// Project-side counterpart of [`Engine::record_task_mutation`].
    pub fn record_project_mutation(
        &self,
        project_id: &str,
        context: &MutationContext,
        pre: Option<&ProjectImage>,
        post: &ProjectImage,
    ) {
        record_project_mutation(&self.store, project_id, context, pre, post);
    }

    /// See [`workflow::submit_for_approval`].
    ///
    /// # Errors
    ///
    /// Propagates the transition's [`WorkflowError`].
    pub fn submit_for_approval(
        &self,
        task_id: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Task, WorkflowError> {
        workflow::submit_for_approval(&self.store, task_id, actor, now)
    }

    /// See [`workflow::approve`].
    ///
    /// # Errors
    ///
    /// Propagates the transition's [`WorkflowError`].
    pub fn approve(
        &self,
        task_id: &str,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Task, WorkflowError> {
        workflow::approve(&self.store, task_id, actor, now)
    }

    /// See [`workflow::reject`].
    ///
    /// # Errors
    ///
    /// Propagates the transition's [`WorkflowError`].
    pub fn reject(
        &self,
        task_id: &str,
        actor: &Actor,
        request: &RejectRequest,
        now: DateTime<Utc>,
    ) -> Result<Task, WorkflowError> {
        workflow::reject(&self.store, task_id, actor, request, now)
    }

    /// See [`workflow::reassign_approved`].
    ///
    /// # Errors
    ///
    /// Propagates the transition's [`WorkflowError`].
    pub fn reassign_approved(
        &self,
        task_id: &str,
        actor: &Actor,
        request: &ReassignRequest,
        now: DateTime<Utc>,
    ) -> Result<Task, WorkflowError> {
        workflow::reassign_approved(&self.store, task_id, actor, request, now)
    }

    /// One page of a task's timeline (newest first) plus metrics computed
    /// over the FULL trail, not just the requested page.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::TaskNotFound`] or a storage error.
    pub fn get_lifecycle(
        &self,
        task_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Lifecycle, WorkflowError> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))?;

        let (timeline, pagination) = self.store.timeline(task_id, page, limit)?;
        let full_trail = self.store.trail_for_entity(task_id)?;
        let metrics = LifecycleMetrics::compute(&task, &full_trail);
        debug!(task_id, entries = full_trail.len(), "computed lifecycle");

        Ok(Lifecycle {
            timeline,
            metrics,
            pagination,
        })
    }

    /// Move a project's dates, appending one [`DateChange`] per field that
    /// actually moved. A `None` argument leaves that field alone. End-date
    /// moves that push the date later also bump the project's deadline
    /// counters. The mutation is audited through the interceptor.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::ProjectNotFound`] or a storage error.
    pub fn change_project_dates(
        &self,
        project_id: &str,
        actor: &Actor,
        new_start: Option<DateTime<Utc>>,
        new_end: Option<DateTime<Utc>>,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Project, WorkflowError> {
        let mut project = self
            .store
            .get_project(project_id)?
            .ok_or_else(|| WorkflowError::ProjectNotFound(project_id.to_string()))?;
        let pre = ProjectImage::from(&project);

        let mut moved = false;
        if let Some(start) = new_start
            && project.start_date != Some(start)
        {
            project.date_changes.push(DateChange {
                field: DateField::StartDate,
                old_value: project.start_date,
                new_value: Some(start),
                changed_by: actor.id.clone(),
                changed_at: now,
                reason: reason.map(str::to_string),
            });
            project.start_date = Some(start);
            moved = true;
        }
        if let Some(end) = new_end
            && project.end_date != Some(end)
        {
            let delay = delay_days(project.end_date, Some(end));
            project.date_changes.push(DateChange {
                field: DateField::EndDate,
                old_value: project.end_date,
                new_value: Some(end),
                changed_by: actor.id.clone(),
                changed_at: now,
                reason: reason.map(str::to_string),
            });
            project.end_date = Some(end);
            if delay > 0 {
                project
                    .metrics
                    .record_extension(u32::try_from(delay).unwrap_or(u32::MAX));
            }
            moved = true;
        }
        if !moved {
            return Ok(project);
        }

        project.updated_at = now;
        self.store.put_project(&project)?;
        record_project_mutation(
            &self.store,
            project_id,
            &MutationContext::new(&actor.id, now),
            Some(&pre),
            &ProjectImage::from(&project),
        );
        Ok(project)
    }

    /// A project's recorded date changes with extension totals. Only
    /// end-date moves that pushed the date later count as extensions.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::ProjectNotFound`] or a storage error.
    pub fn get_date_changes(&self, project_id: &str) -> Result<DateChangeReport, WorkflowError> {
        let project = self
            .store
            .get_project(project_id)?
            .ok_or_else(|| WorkflowError::ProjectNotFound(project_id.to_string()))?;

        let mut total_extensions = 0u32;
        let mut total_delay_days = 0i64;
        for change in &project.date_changes {
            let delay = delay_days(change.old_value, change.new_value);
            if change.field == crate::model::DateField::EndDate && delay > 0 {
                total_extensions = total_extensions.saturating_add(1);
                total_delay_days += delay;
            }
        }

        Ok(DateChangeReport {
            date_changes: project.date_changes.clone(),
            summary: DateChangeSummary {
                total_extensions,
                total_delay_days,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::config::EngineConfig;
    use crate::error::WorkflowError;
    use crate::model::{DateChange, DateField, Project, Status, Task};
    use crate::store::Store;
    use crate::workflow::Actor;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn engine() -> Engine {
        let store = Store::open_in_memory().expect("open store");
        Engine::with_store(store, EngineConfig::default())
    }

    #[test]
    fn lifecycle_for_missing_task_is_not_found() {
        let engine = engine();
        let err = engine.get_lifecycle("task-404", 1, 20).expect_err("missing");
        assert!(matches!(err, WorkflowError::TaskNotFound(_)));
    }

    #[test]
    fn lifecycle_metrics_cover_whole_trail_not_one_page() {
        let engine = engine();
        let store = engine.store();
        store
            .put_project(&Project {
                id: "proj-1".to_string(),
                project_head: "head-1".to_string(),
                ..Project::default()
            })
            .expect("put project");
        store
            .put_task(&Task {
                id: "task-1".to_string(),
                project_id: "proj-1".to_string(),
                status: Status::Done,
                started_at: Some(ts(2)),
                completed_at: Some(ts(4)),
                created_at: ts(1),
                ..Task::default()
            })
            .expect("put task");

        engine
            .submit_for_approval("task-1", &Actor::user("emp-1"), ts(5))
            .expect("submit");
        engine
            .approve("task-1", &Actor::user("head-1"), ts(6))
            .expect("approve");

        let lifecycle = engine.get_lifecycle("task-1", 1, 1).expect("lifecycle");
        // Page holds one entry, metrics still saw both events.
        assert_eq!(lifecycle.timeline.len(), 1);
        assert_eq!(lifecycle.metrics.approval_attempts, 1);
        assert_eq!(lifecycle.pagination.total, 2);
        assert_eq!(lifecycle.pagination.total_pages, 2);
    }

    #[test]
    fn changing_dates_records_history_counters_and_audit() {
        let engine = engine();
        engine
            .store()
            .put_project(&Project {
                id: "proj-1".to_string(),
                project_head: "head-1".to_string(),
                end_date: Some(ts(10)),
                ..Project::default()
            })
            .expect("put project");

        let project = engine
            .change_project_dates(
                "proj-1",
                &Actor::user("head-1"),
                None,
                Some(ts(15)),
                Some("scope grew"),
                ts(9),
            )
            .expect("move end date");

        assert_eq!(project.end_date, Some(ts(15)));
        assert_eq!(project.date_changes.len(), 1);
        assert_eq!(project.date_changes[0].field, DateField::EndDate);
        assert_eq!(project.metrics.times_deadline_extended, 1);
        assert_eq!(project.metrics.total_delay_days, 5);

        let report = engine.get_date_changes("proj-1").expect("report");
        assert_eq!(report.summary.total_extensions, 1);
        assert_eq!(report.summary.total_delay_days, 5);

        let trail = engine
            .store()
            .trail_for_entity("proj-1")
            .expect("trail");
        assert_eq!(trail.len(), 1);
        assert_eq!(
            trail[0].event,
            crate::event::DomainEvent::Project(crate::event::ProjectEvent::EndDateChanged)
        );
        assert_eq!(trail[0].metadata, serde_json::json!({ "delay_days": 5 }));
    }

    #[test]
    fn unchanged_dates_are_a_no_op() {
        let engine = engine();
        engine
            .store()
            .put_project(&Project {
                id: "proj-1".to_string(),
                project_head: "head-1".to_string(),
                end_date: Some(ts(10)),
                ..Project::default()
            })
            .expect("put project");

        let project = engine
            .change_project_dates("proj-1", &Actor::user("head-1"), None, Some(ts(10)), None, ts(9))
            .expect("same end date");

        assert!(project.date_changes.is_empty());
        assert_eq!(project.metrics.times_deadline_extended, 0);
        assert_eq!(engine.store().trail_len().expect("count"), 0);
    }

    #[test]
    fn date_change_summary_counts_only_end_date_extensions() {
        let engine = engine();
        let mut project = Project {
            id: "proj-1".to_string(),
            project_head: "head-1".to_string(),
            ..Project::default()
        };
        project.date_changes = vec![
            // Setting an unset end date has no baseline, so no delay.
            DateChange {
                field: DateField::EndDate,
                old_value: None,
                new_value: Some(ts(10)),
                changed_by: "head-1".to_string(),
                changed_at: ts(8),
                reason: None,
            },
            // End date pushed out 5 days: counts.
            DateChange {
                field: DateField::EndDate,
                old_value: Some(ts(10)),
                new_value: Some(ts(15)),
                changed_by: "head-1".to_string(),
                changed_at: ts(9),
                reason: Some("scope grew".to_string()),
            },
            // End date pulled in: not an extension.
            DateChange {
                field: DateField::EndDate,
                old_value: Some(ts(15)),
                new_value: Some(ts(14)),
                changed_by: "head-1".to_string(),
                changed_at: ts(11),
                reason: None,
            },
            // Start date move never counts.
            DateChange {
                field: DateField::StartDate,
                old_value: Some(ts(1)),
                new_value: Some(ts(3)),
                changed_by: "head-1".to_string(),
                changed_at: ts(2),
                reason: None,
            },
        ];
        engine.store().put_project(&project).expect("put project");

        let report = engine.get_date_changes("proj-1").expect("report");
        assert_eq!(report.date_changes.len(), 4);
        assert_eq!(report.summary.total_extensions, 1);
        assert_eq!(report.summary.total_delay_days, 5);
    }
}
