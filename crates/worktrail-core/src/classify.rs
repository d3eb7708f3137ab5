//! Diff/event classification.
//!
//! A pure function from `(pre-image, post-image)` to at most one typed
//! domain event. Precedence is a fixed table evaluated first-match-wins so a
//! mutation can never be double-classified. When several audited fields
//! change in one mutation only the highest-precedence classification names
//! the event — a deliberate lossy simplification — but every changed field
//! still lands in the entry's `changes` list, so no delta is lost, only the
//! extra event name.
//!
//! Task precedence: created, assigned/reassigned, started, completed,
//! approval transitions, due-date, priority, deleted, reopened, then a
//! generic `status_changed` fallback.
//!
//! Project precedence: created, head change, completed/cancelled/reopened,
//! start/end date (end-date extensions carry `delay_days` metadata), member
//! add/remove, deactivation, then the generic fallback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::event::{DomainEvent, FieldChange, ProjectEvent, TaskEvent};
use crate::model::{ApprovalStatus, Priority, ProjectStatus, Status};

/// Read-only snapshot of the audited task fields.
///
/// This is what the interceptor captures before and after a mutation; the
/// classifier never sees the full aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskImage {
    pub status: Status,
    pub approval_status: ApprovalStatus,
    pub assignee: Option<String>,
    pub priority: Priority,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub is_active: bool,
}

impl From<&crate::model::Task> for TaskImage {
    fn from(task: &crate::model::Task) -> Self {
        Self {
            status: task.status,
            approval_status: task.approval_status,
            assignee: task.assignee.clone(),
            priority: task.priority,
            start_date: task.start_date,
            due_date: task.due_date,
            started_at: task.started_at,
            rejection_reason: task.rejections.last().map(|r| r.reason.clone()),
            is_active: task.is_active,
        }
    }
}

/// Read-only snapshot of the audited project fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectImage {
    pub status: ProjectStatus,
    pub project_head: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub members: Vec<String>,
    pub is_active: bool,
}

impl From<&crate::model::Project> for ProjectImage {
    fn from(project: &crate::model::Project) -> Self {
        Self {
            status: project.status,
            project_head: project.project_head.clone(),
            start_date: project.start_date,
            end_date: project.end_date,
            members: project.members.clone(),
            is_active: project.is_active,
        }
    }
}

/// The outcome of classifying one mutation: the winning event plus every
/// audited field delta and any event-specific metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub event: DomainEvent,
    pub changes: Vec<FieldChange>,
    pub metadata: Value,
}

/// Classify a task mutation. Returns `None` when no audited field changed.
///
/// `pre == None` means the pre-image could not be captured (entity did not
/// exist or vanished concurrently) and always classifies as `created`.
#[must_use]
pub fn classify_task(pre: Option<&TaskImage>, post: &TaskImage) -> Option<Classification> {
    let Some(pre) = pre else {
        return Some(Classification {
            event: DomainEvent::Task(TaskEvent::Created),
            changes: Vec::new(),
            metadata: Value::Null,
        });
    };

    let changes = task_changes(pre, post);
    if changes.is_empty() {
        return None;
    }

    let event = task_event(pre, post)?;
    Some(Classification {
        event: DomainEvent::Task(event),
        changes,
        metadata: Value::Null,
    })
}

fn task_event(pre: &TaskImage, post: &TaskImage) -> Option<TaskEvent> {
    if pre.assignee != post.assignee {
        return Some(if pre.assignee.is_none() {
            TaskEvent::Assigned
        } else {
            TaskEvent::Reassigned
        });
    }

    let status_changed = pre.status != post.status;

    if status_changed && post.status == Status::InProgress && pre.started_at.is_none() {
        return Some(TaskEvent::Started);
    }
    if status_changed && post.status == Status::Done {
        return Some(TaskEvent::Completed);
    }

    if pre.approval_status != post.approval_status {
        match post.approval_status {
            ApprovalStatus::PendingApproval => return Some(TaskEvent::SubmittedForApproval),
            ApprovalStatus::Approved => return Some(TaskEvent::Approved),
            ApprovalStatus::Rejected => return Some(TaskEvent::Rejected),
            ApprovalStatus::NotRequired => {}
        }
    }

    if pre.due_date != post.due_date {
        return Some(TaskEvent::DueDateChanged);
    }
    if pre.priority != post.priority {
        return Some(TaskEvent::PriorityChanged);
    }
    if pre.is_active && !post.is_active {
        return Some(TaskEvent::Deleted);
    }

    // Leaving done outside a rejection cycle is a reopen; anything else that
    // moved status is the generic fallback.
    if status_changed && pre.status == Status::Done
        && post.approval_status != ApprovalStatus::Rejected
    {
        return Some(TaskEvent::Reopened);
    }
    if status_changed {
        return Some(TaskEvent::StatusChanged);
    }

    None
}

fn task_changes(pre: &TaskImage, post: &TaskImage) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if pre.status != post.status {
        changes.push(FieldChange::new("status", &pre.status, &post.status));
    }
    if pre.approval_status != post.approval_status {
        changes.push(FieldChange::new(
            "approval_status",
            &pre.approval_status,
            &post.approval_status,
        ));
    }
    if pre.assignee != post.assignee {
        changes.push(FieldChange::new("assignee", &pre.assignee, &post.assignee));
    }
    if pre.priority != post.priority {
        changes.push(FieldChange::new("priority", &pre.priority, &post.priority));
    }
    if pre.start_date != post.start_date {
        changes.push(FieldChange::new(
            "start_date",
            &pre.start_date,
            &post.start_date,
        ));
    }
    if pre.due_date != post.due_date {
        changes.push(FieldChange::new("due_date", &pre.due_date, &post.due_date));
    }
    if pre.rejection_reason != post.rejection_reason {
        changes.push(FieldChange::new(
            "rejection_reason",
            &pre.rejection_reason,
            &post.rejection_reason,
        ));
    }
    if pre.is_active != post.is_active {
        changes.push(FieldChange::new(
            "is_active",
            &pre.is_active,
            &post.is_active,
        ));
    }

    changes
}

/// Classify a project mutation. Same contract as [`classify_task`].
#[must_use]
pub fn classify_project(pre: Option<&ProjectImage>, post: &ProjectImage) -> Option<Classification> {
    let Some(pre) = pre else {
        return Some(Classification {
            event: DomainEvent::Project(ProjectEvent::Created),
            changes: Vec::new(),
            metadata: Value::Null,
        });
    };

    let changes = project_changes(pre, post);
    if changes.is_empty() {
        return None;
    }

    let (event, metadata) = project_event(pre, post)?;
    Some(Classification {
        event: DomainEvent::Project(event),
        changes,
        metadata,
    })
}

fn project_event(pre: &ProjectImage, post: &ProjectImage) -> Option<(ProjectEvent, Value)> {
    if pre.project_head != post.project_head {
        return Some((ProjectEvent::HeadChanged, Value::Null));
    }

    let status_changed = pre.status != post.status;
    if status_changed {
        match post.status {
            ProjectStatus::Completed => return Some((ProjectEvent::Completed, Value::Null)),
            ProjectStatus::Cancelled => return Some((ProjectEvent::Cancelled, Value::Null)),
            ProjectStatus::Planning | ProjectStatus::Active | ProjectStatus::OnHold => {
                if matches!(
                    pre.status,
                    ProjectStatus::Completed | ProjectStatus::Cancelled
                ) {
                    return Some((ProjectEvent::Reopened, Value::Null));
                }
            }
        }
    }

    if pre.start_date != post.start_date {
        return Some((ProjectEvent::StartDateChanged, Value::Null));
    }
    if pre.end_date != post.end_date {
        let delay = delay_days(pre.end_date, post.end_date);
        let metadata = if delay > 0 {
            json!({ "delay_days": delay })
        } else {
            Value::Null
        };
        return Some((ProjectEvent::EndDateChanged, metadata));
    }

    if let Some(member) = first_missing(&post.members, &pre.members) {
        return Some((ProjectEvent::MemberAdded, json!({ "member": member })));
    }
    if let Some(member) = first_missing(&pre.members, &post.members) {
        return Some((ProjectEvent::MemberRemoved, json!({ "member": member })));
    }

    // Deactivation without a status move reads as a cancellation.
    if pre.is_active && !post.is_active {
        return Some((ProjectEvent::Cancelled, Value::Null));
    }
    if status_changed {
        return Some((ProjectEvent::StatusChanged, Value::Null));
    }

    None
}

fn project_changes(pre: &ProjectImage, post: &ProjectImage) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    if pre.status != post.status {
        changes.push(FieldChange::new("status", &pre.status, &post.status));
    }
    if pre.project_head != post.project_head {
        changes.push(FieldChange::new(
            "project_head",
            &pre.project_head,
            &post.project_head,
        ));
    }
    if pre.start_date != post.start_date {
        changes.push(FieldChange::new(
            "start_date",
            &pre.start_date,
            &post.start_date,
        ));
    }
    if pre.end_date != post.end_date {
        changes.push(FieldChange::new("end_date", &pre.end_date, &post.end_date));
    }
    if pre.members != post.members {
        changes.push(FieldChange::new("members", &pre.members, &post.members));
    }
    if pre.is_active != post.is_active {
        changes.push(FieldChange::new(
            "is_active",
            &pre.is_active,
            &post.is_active,
        ));
    }

    changes
}

/// Calendar days the end date moved later; 0 when it moved earlier, stayed,
/// or either side is unset.
#[must_use]
pub fn delay_days(old_end: Option<DateTime<Utc>>, new_end: Option<DateTime<Utc>>) -> i64 {
    match (old_end, new_end) {
        (Some(old), Some(new)) => (new - old).num_days().max(0),
        _ => 0,
    }
}

fn first_missing(haystack: &[String], reference: &[String]) -> Option<String> {
    haystack
        .iter()
        .find(|member| !reference.contains(member))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::{
        ProjectImage, TaskImage, classify_project, classify_task, delay_days,
    };
    use crate::event::{DomainEvent, ProjectEvent, TaskEvent};
    use crate::model::{ApprovalStatus, Priority, ProjectStatus, Status};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn base_task() -> TaskImage {
        TaskImage {
            status: Status::ToDo,
            approval_status: ApprovalStatus::NotRequired,
            assignee: Some("emp-1".to_string()),
            priority: Priority::Medium,
            start_date: None,
            due_date: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
            started_at: None,
            rejection_reason: None,
            is_active: true,
        }
    }

    fn base_project() -> ProjectImage {
        ProjectImage {
            status: ProjectStatus::Active,
            project_head: "head-1".to_string(),
            start_date: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            end_date: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            members: vec!["emp-1".to_string(), "emp-2".to_string()],
            is_active: true,
        }
    }

    #[test]
    fn missing_pre_image_classifies_as_created() {
        let post = base_task();
        let classified = classify_task(None, &post).expect("event");
        assert_eq!(classified.event, DomainEvent::Task(TaskEvent::Created));
        assert!(classified.changes.is_empty());
    }

    #[test]
    fn unchanged_images_emit_nothing() {
        let image = base_task();
        assert!(classify_task(Some(&image), &image).is_none());
        let project = base_project();
        assert!(classify_project(Some(&project), &project).is_none());
    }

    #[test]
    fn first_assignment_is_assigned_not_reassigned() {
        let mut pre = base_task();
        pre.assignee = None;
        let post = base_task();
        let classified = classify_task(Some(&pre), &post).expect("event");
        assert_eq!(classified.event, DomainEvent::Task(TaskEvent::Assigned));

        let mut repost = base_task();
        repost.assignee = Some("emp-2".to_string());
        let classified = classify_task(Some(&base_task()), &repost).expect("event");
        assert_eq!(classified.event, DomainEvent::Task(TaskEvent::Reassigned));
    }

    #[test]
    fn first_move_to_in_progress_is_started() {
        let pre = base_task();
        let mut post = base_task();
        post.status = Status::InProgress;
        post.started_at = Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());

        let classified = classify_task(Some(&pre), &post).expect("event");
        assert_eq!(classified.event, DomainEvent::Task(TaskEvent::Started));

        // A later return to in-progress is no longer "started".
        let mut pre2 = base_task();
        pre2.status = Status::ToDo;
        pre2.started_at = post.started_at;
        let classified = classify_task(Some(&pre2), &post).expect("event");
        assert_eq!(
            classified.event,
            DomainEvent::Task(TaskEvent::StatusChanged)
        );
    }

    #[test]
    fn completion_beats_due_date_change_in_precedence() {
        let pre = base_task();
        let mut post = base_task();
        post.status = Status::Done;
        post.due_date = Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

        let classified = classify_task(Some(&pre), &post).expect("event");
        assert_eq!(classified.event, DomainEvent::Task(TaskEvent::Completed));
        // The losing field's delta is still recorded.
        let fields: Vec<&str> = classified.changes.iter().map(|c| c.field.as_str()).collect();
        assert!(fields.contains(&"status"));
        assert!(fields.contains(&"due_date"));
    }

    #[test]
    fn approval_transitions_classify_by_target_state() {
        let mut pre = base_task();
        pre.status = Status::Done;

        let mut post = pre.clone();
        post.approval_status = ApprovalStatus::PendingApproval;
        assert_eq!(
            classify_task(Some(&pre), &post).expect("event").event,
            DomainEvent::Task(TaskEvent::SubmittedForApproval)
        );

        let mut pre = post.clone();
        let mut post = pre.clone();
        post.approval_status = ApprovalStatus::Approved;
        assert_eq!(
            classify_task(Some(&pre), &post).expect("event").event,
            DomainEvent::Task(TaskEvent::Approved)
        );

        pre.approval_status = ApprovalStatus::PendingApproval;
        let mut post = pre.clone();
        post.approval_status = ApprovalStatus::Rejected;
        post.status = Status::ToDo;
        assert_eq!(
            classify_task(Some(&pre), &post).expect("event").event,
            DomainEvent::Task(TaskEvent::Rejected)
        );
    }

    #[test]
    fn priority_and_deletion() {
        let pre = base_task();
        let mut post = base_task();
        post.priority = Priority::Urgent;
        assert_eq!(
            classify_task(Some(&pre), &post).expect("event").event,
            DomainEvent::Task(TaskEvent::PriorityChanged)
        );

        let mut post = base_task();
        post.is_active = false;
        assert_eq!(
            classify_task(Some(&pre), &post).expect("event").event,
            DomainEvent::Task(TaskEvent::Deleted)
        );
    }

    #[test]
    fn leaving_done_outside_rejection_is_reopened() {
        let mut pre = base_task();
        pre.status = Status::Done;
        pre.approval_status = ApprovalStatus::Approved;
        // A task that reached done was started at some point.
        pre.started_at = Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());

        let mut post = pre.clone();
        post.status = Status::InProgress;
        assert_eq!(
            classify_task(Some(&pre), &post).expect("event").event,
            DomainEvent::Task(TaskEvent::Reopened)
        );
    }

    #[test]
    fn project_deadline_extension_carries_delay_days() {
        let pre = base_project();
        let mut post = base_project();
        post.end_date = Some(Utc.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap());

        let classified = classify_project(Some(&pre), &post).expect("event");
        assert_eq!(
            classified.event,
            DomainEvent::Project(ProjectEvent::EndDateChanged)
        );
        assert_eq!(classified.metadata, json!({"delay_days": 7}));
    }

    #[test]
    fn project_deadline_pulled_in_has_no_delay_metadata() {
        let pre = base_project();
        let mut post = base_project();
        post.end_date = Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());

        let classified = classify_project(Some(&pre), &post).expect("event");
        assert_eq!(
            classified.event,
            DomainEvent::Project(ProjectEvent::EndDateChanged)
        );
        assert_eq!(classified.metadata, serde_json::Value::Null);
    }

    #[test]
    fn project_membership_diffs() {
        let pre = base_project();
        let mut post = base_project();
        post.members.push("emp-3".to_string());

        let classified = classify_project(Some(&pre), &post).expect("event");
        assert_eq!(
            classified.event,
            DomainEvent::Project(ProjectEvent::MemberAdded)
        );
        assert_eq!(classified.metadata, json!({"member": "emp-3"}));

        let mut removed = base_project();
        removed.members.retain(|m| m != "emp-2");
        let classified = classify_project(Some(&pre), &removed).expect("event");
        assert_eq!(
            classified.event,
            DomainEvent::Project(ProjectEvent::MemberRemoved)
        );
        assert_eq!(classified.metadata, json!({"member": "emp-2"}));
    }

    #[test]
    fn project_status_terminals_and_reopen() {
        let pre = base_project();
        let mut post = base_project();
        post.status = ProjectStatus::Completed;
        assert_eq!(
            classify_project(Some(&pre), &post).expect("event").event,
            DomainEvent::Project(ProjectEvent::Completed)
        );

        post.status = ProjectStatus::Cancelled;
        assert_eq!(
            classify_project(Some(&pre), &post).expect("event").event,
            DomainEvent::Project(ProjectEvent::Cancelled)
        );

        let mut pre2 = base_project();
        pre2.status = ProjectStatus::Cancelled;
        let mut post2 = base_project();
        post2.status = ProjectStatus::Active;
        assert_eq!(
            classify_project(Some(&pre2), &post2).expect("event").event,
            DomainEvent::Project(ProjectEvent::Reopened)
        );

        // On-hold from active has no specific event.
        let mut post3 = base_project();
        post3.status = ProjectStatus::OnHold;
        assert_eq!(
            classify_project(Some(&pre), &post3).expect("event").event,
            DomainEvent::Project(ProjectEvent::StatusChanged)
        );
    }

    #[test]
    fn head_change_beats_everything_but_creation() {
        let pre = base_project();
        let mut post = base_project();
        post.project_head = "head-2".to_string();
        post.status = ProjectStatus::Completed;

        let classified = classify_project(Some(&pre), &post).expect("event");
        assert_eq!(
            classified.event,
            DomainEvent::Project(ProjectEvent::HeadChanged)
        );
        assert_eq!(classified.changes.len(), 2);
    }

    #[test]
    fn delay_days_clamps_and_handles_unset() {
        let old = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        let new = Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(delay_days(old, new), 0);
        assert_eq!(delay_days(None, new), 0);
        assert_eq!(delay_days(old, None), 0);
        assert_eq!(delay_days(new, old), 31);
    }
}
