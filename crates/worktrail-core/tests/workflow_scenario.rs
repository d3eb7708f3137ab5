//! End-to-end workflow scenarios through the engine facade: a full
//! reject/resubmit/approve cycle, guard failures leaving state untouched,
//! and trail-derived lifecycle metrics.

use chrono::{DateTime, TimeZone, Utc};
use worktrail_core::classify::TaskImage;
use worktrail_core::config::EngineConfig;
use worktrail_core::engine::Engine;
use worktrail_core::error::WorkflowError;
use worktrail_core::event::{DomainEvent, TaskEvent};
use worktrail_core::intercept::MutationContext;
use worktrail_core::model::{ApprovalStatus, Project, Status, Task};
use worktrail_core::store::Store;
use worktrail_core::workflow::{Actor, RejectRequest};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
}

fn engine_with_project() -> Engine {
    let store = Store::open_in_memory().expect("open store");
    let engine = Engine::with_store(store, EngineConfig::default());
    engine
        .store()
        .put_project(&Project {
            id: "proj-1".to_string(),
            workspace_id: "ws-1".to_string(),
            name: "Q1 launch".to_string(),
            project_head: "head-1".to_string(),
            members: vec!["emp-1".to_string()],
            created_at: at(1, 0),
            updated_at: at(1, 0),
            ..Project::default()
        })
        .expect("put project");
    engine
}

/// Apply a task mutation the way an outer CRUD layer would: write the row,
/// then hand pre/post images to the interceptor.
fn mutate(engine: &Engine, pre: Option<&Task>, post: &Task, actor: &str, ts: DateTime<Utc>) {
    engine.store().put_task(post).expect("put task");
    let pre_image = pre.map(TaskImage::from);
    engine.record_task_mutation(
        &post.id,
        &MutationContext::new(actor, ts),
        pre_image.as_ref(),
        &TaskImage::from(post),
    );
}

// ---------------------------------------------------------------------------
// The January scenario
// ---------------------------------------------------------------------------

/// Created 01-01, started 01-02, submitted 01-05, rejected with a new due
/// date of 01-10, resubmitted, approved 01-09. The trail must show one
/// rejection and two submissions, and total duration only appears once the
/// task is complete again.
#[test]
fn reject_resubmit_approve_cycle() {
    let engine = engine_with_project();

    let created = Task {
        id: "task-1".to_string(),
        workspace_id: "ws-1".to_string(),
        project_id: "proj-1".to_string(),
        title: "Ship the launch checklist".to_string(),
        assignee: Some("emp-1".to_string()),
        creator: "head-1".to_string(),
        due_date: Some(at(6, 0)),
        created_at: at(1, 0),
        updated_at: at(1, 0),
        ..Task::default()
    };
    mutate(&engine, None, &created, "head-1", at(1, 0));

    let mut started = created.clone();
    started.status = Status::InProgress;
    started.started_at = Some(at(2, 0));
    started.updated_at = at(2, 0);
    mutate(&engine, Some(&created), &started, "emp-1", at(2, 0));

    let mut done = started.clone();
    done.status = Status::Done;
    done.completed_at = Some(at(4, 18));
    done.updated_at = at(4, 18);
    mutate(&engine, Some(&started), &done, "emp-1", at(4, 18));

    engine
        .submit_for_approval("task-1", &Actor::user("emp-1"), at(5, 0))
        .expect("first submission");

    let rejected = engine
        .reject(
            "task-1",
            &Actor::user("head-1"),
            &RejectRequest {
                reason: "checklist incomplete".to_string(),
                new_start_date: at(5, 12),
                new_due_date: at(10, 0),
                reassignee: None,
            },
            at(5, 6),
        )
        .expect("rejection");
    assert_eq!(rejected.status, Status::ToDo);
    assert_eq!(rejected.completed_at, None);
    assert_eq!(rejected.due_date, Some(at(10, 0)));

    // Before re-completion, lifecycle duration is zeroed (no completed_at).
    let mid = engine.get_lifecycle("task-1", 1, 50).expect("mid lifecycle");
    assert_eq!(mid.metrics.total_duration_hours, 0.0);
    assert_eq!(mid.metrics.rejection_count, 1);

    let mut redone = engine
        .store()
        .get_task("task-1")
        .expect("get")
        .expect("present");
    let before_redo = redone.clone();
    redone.status = Status::Done;
    redone.completed_at = Some(at(8, 0));
    redone.updated_at = at(8, 0);
    mutate(&engine, Some(&before_redo), &redone, "emp-1", at(8, 0));

    engine
        .submit_for_approval("task-1", &Actor::user("emp-1"), at(8, 6))
        .expect("second submission");
    let approved = engine
        .approve("task-1", &Actor::user("head-1"), at(9, 0))
        .expect("approval");
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert_eq!(approved.metrics.approval_attempts, 2);
    assert_eq!(approved.metrics.times_rejected, 1);

    let lifecycle = engine.get_lifecycle("task-1", 1, 50).expect("lifecycle");
    assert_eq!(lifecycle.metrics.rejection_count, 1);
    assert_eq!(lifecycle.metrics.approval_attempts, 2);
    // created 01-01T00 -> completed 01-08T00 = 168h.
    assert!((lifecycle.metrics.total_duration_hours - 168.0).abs() < 1e-9);
    assert!(!lifecycle.metrics.anomaly);

    let events: Vec<DomainEvent> = engine
        .store()
        .trail_for_entity("task-1")
        .expect("trail")
        .iter()
        .map(|e| e.event)
        .collect();
    assert_eq!(
        events,
        vec![
            DomainEvent::Task(TaskEvent::Created),
            DomainEvent::Task(TaskEvent::Started),
            DomainEvent::Task(TaskEvent::Completed),
            DomainEvent::Task(TaskEvent::SubmittedForApproval),
            DomainEvent::Task(TaskEvent::Rejected),
            DomainEvent::Task(TaskEvent::Completed),
            DomainEvent::Task(TaskEvent::SubmittedForApproval),
            DomainEvent::Task(TaskEvent::Approved),
        ]
    );
}

// ---------------------------------------------------------------------------
// Guard failures
// ---------------------------------------------------------------------------

/// A reject with a reversed date range fails validation and writes nothing,
/// not even the rejection record.
#[test]
fn reversed_reject_dates_leave_task_untouched() {
    let engine = engine_with_project();
    let task = Task {
        id: "task-1".to_string(),
        workspace_id: "ws-1".to_string(),
        project_id: "proj-1".to_string(),
        status: Status::Done,
        assignee: Some("emp-1".to_string()),
        completed_at: Some(at(4, 0)),
        created_at: at(1, 0),
        updated_at: at(4, 0),
        ..Task::default()
    };
    engine.store().put_task(&task).expect("put task");
    engine
        .submit_for_approval("task-1", &Actor::user("emp-1"), at(5, 0))
        .expect("submit");
    let before = engine
        .store()
        .get_task("task-1")
        .expect("get")
        .expect("present");

    let err = engine
        .reject(
            "task-1",
            &Actor::user("head-1"),
            &RejectRequest {
                reason: "dates are wrong".to_string(),
                new_start_date: at(12, 0),
                new_due_date: at(11, 0),
                reassignee: None,
            },
            at(5, 6),
        )
        .expect_err("validation failure");
    assert!(matches!(err, WorkflowError::Validation { .. }));

    let after = engine
        .store()
        .get_task("task-1")
        .expect("get")
        .expect("present");
    assert_eq!(before, after);
}

/// Two approvals racing on one pending task: one `approved` event lands and
/// the loser sees `InvalidTransition` carrying the post-race state.
#[test]
fn double_approval_has_one_winner() {
    let engine = engine_with_project();
    let task = Task {
        id: "task-1".to_string(),
        workspace_id: "ws-1".to_string(),
        project_id: "proj-1".to_string(),
        status: Status::Done,
        assignee: Some("emp-1".to_string()),
        started_at: Some(at(2, 0)),
        completed_at: Some(at(4, 0)),
        created_at: at(1, 0),
        updated_at: at(4, 0),
        ..Task::default()
    };
    engine.store().put_task(&task).expect("put task");
    engine
        .submit_for_approval("task-1", &Actor::user("emp-1"), at(5, 0))
        .expect("submit");

    let winner = engine.approve("task-1", &Actor::user("head-1"), at(5, 1));
    let loser = engine.approve("task-1", &Actor::admin("admin-1"), at(5, 1));

    assert!(winner.is_ok());
    match loser.expect_err("second approval loses") {
        WorkflowError::InvalidTransition { state, .. } => {
            assert_eq!(state.approval_status, ApprovalStatus::Approved);
        }
        other => panic!("unexpected error: {other}"),
    }

    let approvals = engine
        .store()
        .trail_for_entity("task-1")
        .expect("trail")
        .iter()
        .filter(|e| e.event == DomainEvent::Task(TaskEvent::Approved))
        .count();
    assert_eq!(approvals, 1);
}
