//! Task approval/rejection/reassignment state machine.
//!
//! Every transition follows the same shape: read the entity fresh, evaluate
//! guards against what was read, build the updated aggregate in memory, and
//! commit it with a compare-and-swap guarded on the state the guards saw
//! ([`crate::store::Store::cas_task`]). Two racing transitions can both pass
//! their guards, but only one swap lands; the loser gets
//! [`WorkflowError::InvalidTransition`] with the state that beat it. Guard
//! failures never partially apply.
//!
//! Transitions are themselves mutation sources: the winning write is handed
//! to the interceptor like any other mutation, so `approve` produces a
//! `task.approved` trail entry through the same classifier path.

use chrono::{DateTime, Utc};

use crate::classify::TaskImage;
use crate::error::{CurrentState, WorkflowError};
use crate::intercept::{MutationContext, record_task_mutation};
use crate::model::{ApprovalStatus, Rejection, Status, Task};
use crate::store::Store;

/// The caller's identity and role, as asserted by the outer layer.
///
/// The engine does not own user records; the collaborator that
/// authenticated the request tells us whether the actor is a workspace
/// admin. Project-head status is checked against the task's project.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub is_admin: bool,
}

impl Actor {
    #[must_use]
    pub fn user(id: &str) -> Self {
        Self {
            id: id.to_string(),
            is_admin: false,
        }
    }

    #[must_use]
    pub fn admin(id: &str) -> Self {
        Self {
            id: id.to_string(),
            is_admin: true,
        }
    }
}

/// Parameters for the `reject` transition.
#[derive(Debug, Clone)]
pub struct RejectRequest {
    pub reason: String,
    pub new_start_date: DateTime<Utc>,
    pub new_due_date: DateTime<Utc>,
    pub reassignee: Option<String>,
}

/// Parameters for the `reassign_approved` transition.
#[derive(Debug, Clone)]
pub struct ReassignRequest {
    pub assignee: String,
    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

const fn current_state(task: &Task) -> CurrentState {
    CurrentState {
        status: task.status,
        approval_status: task.approval_status,
    }
}

/// Mark a completed task as awaiting review.
///
/// Guard: `status == done && approval_status != pending-approval`. Sets
/// `submitted_for_approval_at` and bumps `approval_attempts`.
///
/// # Errors
///
/// [`WorkflowError::InvalidTransition`] when the guard fails or the task
/// moved concurrently; [`WorkflowError::TaskNotFound`] when it is missing.
pub fn submit_for_approval(
    store: &Store,
    task_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Task, WorkflowError> {
    let task = fetch_task(store, task_id)?;

    if task.status != Status::Done || task.approval_status == ApprovalStatus::PendingApproval {
        return Err(WorkflowError::InvalidTransition {
            attempted: "submit_for_approval",
            state: current_state(&task),
        });
    }

    let mut updated = task.clone();
    updated.approval_status = ApprovalStatus::PendingApproval;
    updated.submitted_for_approval_at = Some(now);
    updated.metrics.bump_approval_attempts();
    updated.updated_at = now;

    commit(store, "submit_for_approval", &task, updated, actor, now)
}

/// Approve a pending task. Actor must be the project head or an admin.
///
/// Folds the completed cycle's working time into
/// `metrics.total_working_hours`.
///
/// # Errors
///
/// [`WorkflowError::PermissionDenied`] for a non-head non-admin actor;
/// [`WorkflowError::InvalidTransition`] when the task is not pending
/// approval or moved concurrently.
pub fn approve(
    store: &Store,
    task_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Task, WorkflowError> {
    let task = fetch_task(store, task_id)?;
    require_decider(store, &task, actor, "approve")?;

    if task.approval_status != ApprovalStatus::PendingApproval {
        return Err(WorkflowError::InvalidTransition {
            attempted: "approve",
            state: current_state(&task),
        });
    }

    let mut updated = task.clone();
    updated.approval_status = ApprovalStatus::Approved;
    updated.approved_at = Some(now);
    updated.approved_by = Some(actor.id.clone());
    if let (Some(started), Some(completed)) = (task.started_at, task.completed_at) {
        updated.metrics.add_working_hours(hours_between(started, completed));
    }
    updated.updated_at = now;

    commit(store, "approve", &task, updated, actor, now)
}

/// Reject a pending task back to `to-do` with a fresh schedule.
///
/// Appends a [`Rejection`] record, bumps `times_rejected` (and
/// `times_reassigned` when a reassignee is supplied), and clears
/// `completed_at` — the work is no longer done.
///
/// # Errors
///
/// [`WorkflowError::Validation`] when the reason is empty or
/// `new_start_date >= new_due_date` (nothing is written);
/// [`WorkflowError::PermissionDenied`] / [`WorkflowError::InvalidTransition`]
/// as for [`approve`].
pub fn reject(
    store: &Store,
    task_id: &str,
    actor: &Actor,
    request: &RejectRequest,
    now: DateTime<Utc>,
) -> Result<Task, WorkflowError> {
    if request.reason.trim().is_empty() {
        return Err(WorkflowError::Validation {
            reason: "rejection reason must not be empty".to_string(),
        });
    }
    if request.new_start_date >= request.new_due_date {
        return Err(WorkflowError::Validation {
            reason: format!(
                "new_start_date ({}) must be before new_due_date ({})",
                request.new_start_date, request.new_due_date
            ),
        });
    }

    let task = fetch_task(store, task_id)?;
    require_decider(store, &task, actor, "reject")?;

    if task.approval_status != ApprovalStatus::PendingApproval {
        return Err(WorkflowError::InvalidTransition {
            attempted: "reject",
            state: current_state(&task),
        });
    }

    let mut updated = task.clone();
    updated.rejections.push(Rejection {
        rejected_by: actor.id.clone(),
        rejected_at: now,
        reason: request.reason.clone(),
        reassigned_to: request.reassignee.clone(),
        new_due_date: Some(request.new_due_date),
    });
    updated.approval_status = ApprovalStatus::Rejected;
    updated.status = Status::ToDo;
    updated.start_date = Some(request.new_start_date);
    updated.due_date = Some(request.new_due_date);
    updated.completed_at = None;
    updated.metrics.bump_rejected();
    if let Some(reassignee) = &request.reassignee {
        updated.assignee = Some(reassignee.clone());
        updated.metrics.bump_reassigned();
    }
    updated.updated_at = now;

    commit(store, "reject", &task, updated, actor, now)
}

/// Hand an approved task to a new assignee and start a fresh cycle.
///
/// Resets `approval_status` to `not-required` until the next completion,
/// clears the per-cycle timestamps, and bumps `times_reassigned`.
///
/// # Errors
///
/// [`WorkflowError::Validation`] when `start_date >= due_date`;
/// [`WorkflowError::PermissionDenied`] / [`WorkflowError::InvalidTransition`]
/// as for [`approve`].
pub fn reassign_approved(
    store: &Store,
    task_id: &str,
    actor: &Actor,
    request: &ReassignRequest,
    now: DateTime<Utc>,
) -> Result<Task, WorkflowError> {
    if request.start_date >= request.due_date {
        return Err(WorkflowError::Validation {
            reason: format!(
                "start_date ({}) must be before due_date ({})",
                request.start_date, request.due_date
            ),
        });
    }

    let task = fetch_task(store, task_id)?;
    require_decider(store, &task, actor, "reassign_approved")?;

    if task.approval_status != ApprovalStatus::Approved {
        return Err(WorkflowError::InvalidTransition {
            attempted: "reassign_approved",
            state: current_state(&task),
        });
    }

    let mut updated = task.clone();
    updated.assignee = Some(request.assignee.clone());
    updated.status = Status::ToDo;
    updated.approval_status = ApprovalStatus::NotRequired;
    updated.start_date = Some(request.start_date);
    updated.due_date = Some(request.due_date);
    updated.started_at = None;
    updated.completed_at = None;
    updated.submitted_for_approval_at = None;
    updated.approved_at = None;
    updated.approved_by = None;
    updated.metrics.bump_reassigned();
    updated.updated_at = now;

    commit(store, "reassign_approved", &task, updated, actor, now)
}

#[allow(clippy::cast_precision_loss)]
fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 3600.0
}

fn fetch_task(store: &Store, task_id: &str) -> Result<Task, WorkflowError> {
    store
        .get_task(task_id)?
        .ok_or_else(|| WorkflowError::TaskNotFound(task_id.to_string()))
}

/// Approval decisions require the task's project head or an admin.
fn require_decider(
    store: &Store,
    task: &Task,
    actor: &Actor,
    attempted: &'static str,
) -> Result<(), WorkflowError> {
    if actor.is_admin {
        return Ok(());
    }

    let project = store
        .get_project(&task.project_id)?
        .ok_or_else(|| WorkflowError::ProjectNotFound(task.project_id.clone()))?;

    if project.project_head == actor.id {
        Ok(())
    } else {
        Err(WorkflowError::PermissionDenied {
            actor: actor.id.clone(),
            attempted,
            state: current_state(task),
        })
    }
}

/// Commit the transition with a CAS on the state the guards evaluated, then
/// audit the winning write. A missed swap means a concurrent transition won;
/// the caller gets the state that is now current.
fn commit(
    store: &Store,
    attempted: &'static str,
    read: &Task,
    updated: Task,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Task, WorkflowError> {
    let swapped = store.cas_task(&updated, read.status, read.approval_status)?;
    if !swapped {
        let lost_to = fetch_task(store, &read.id)?;
        return Err(WorkflowError::InvalidTransition {
            attempted,
            state: current_state(&lost_to),
        });
    }

    let pre = TaskImage::from(read);
    let post = TaskImage::from(&updated);
    record_task_mutation(
        store,
        &updated.id,
        &MutationContext::new(&actor.id, now),
        Some(&pre),
        &post,
    );

    Ok(updated)
}
