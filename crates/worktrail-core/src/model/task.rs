use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The three task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    ToDo,
    InProgress,
    Done,
}

impl Status {
    const fn as_str(self) -> &'static str {
        match self {
            Self::ToDo => "to-do",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }
}

/// The approval sub-state layered on top of [`Status`].
///
/// A task only enters `PendingApproval` once it is `Done` and its completion
/// has been submitted for review. A rejection bounces the task back to
/// `ToDo` with a fresh due date; an approved task stays `Done` until a
/// reassignment resets the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalStatus {
    NotRequired,
    PendingApproval,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::NotRequired => "not-required",
            Self::PendingApproval => "pending-approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Task priority, audited but free of workflow semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Priority {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

/// One recorded rejection of a submitted task.
///
/// Appended by the `reject` transition and never edited afterwards. The
/// transition guard requires `new_due_date`; it is optional here only so
/// that trails written before the guard existed still deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub rejected_by: String,
    pub rejected_at: DateTime<Utc>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reassigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_due_date: Option<DateTime<Utc>>,
}

/// Monotonically non-decreasing workflow counters.
///
/// Unsigned by construction so they can never go negative; transitions only
/// ever call the `bump_*` methods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TaskMetrics {
    pub times_reassigned: u32,
    pub times_rejected: u32,
    pub total_working_hours: f64,
    pub approval_attempts: u32,
}

impl TaskMetrics {
    pub fn bump_reassigned(&mut self) {
        self.times_reassigned = self.times_reassigned.saturating_add(1);
    }

    pub fn bump_rejected(&mut self) {
        self.times_rejected = self.times_rejected.saturating_add(1);
    }

    pub fn bump_approval_attempts(&mut self) {
        self.approval_attempts = self.approval_attempts.saturating_add(1);
    }

    /// Accumulate working time on completion. Negative spans are ignored so
    /// the total stays non-decreasing even with skewed clocks.
    pub fn add_working_hours(&mut self, hours: f64) {
        if hours.is_finite() && hours > 0.0 {
            self.total_working_hours += hours;
        }
    }
}

/// All persisted fields for a task (the aggregate the store projects).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: String,
    pub workspace_id: String,
    pub project_id: String,
    pub title: String,
    pub status: Status,
    pub approval_status: ApprovalStatus,
    pub priority: Priority,
    pub assignee: Option<String>,
    pub creator: String,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub submitted_for_approval_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub is_active: bool,
    pub rejections: Vec<Rejection>,
    pub metrics: TaskMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Task {
    fn default() -> Self {
        Self {
            id: String::new(),
            workspace_id: String::new(),
            project_id: String::new(),
            title: String::new(),
            status: Status::ToDo,
            approval_status: ApprovalStatus::NotRequired,
            priority: Priority::default(),
            assignee: None,
            creator: String::new(),
            start_date: None,
            due_date: None,
            started_at: None,
            completed_at: None,
            submitted_for_approval_at: None,
            approved_at: None,
            approved_by: None,
            is_active: true,
            rejections: Vec::new(),
            metrics: TaskMetrics::default(),
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }
}

impl Task {
    /// Whether the approval sub-state is currently awaiting a decision.
    #[must_use]
    pub fn is_pending_approval(&self) -> bool {
        self.approval_status == ApprovalStatus::PendingApproval
    }

    /// The invariant every persisted task must satisfy: a task can only be
    /// pending approval while it is done.
    #[must_use]
    pub fn approval_state_consistent(&self) -> bool {
        self.approval_status != ApprovalStatus::PendingApproval || self.status == Status::Done
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "to-do" | "todo" => Ok(Self::ToDo),
            "in-progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "not-required" => Ok(Self::NotRequired),
            "pending-approval" => Ok(Self::PendingApproval),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseEnumError {
                expected: "approval status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}
