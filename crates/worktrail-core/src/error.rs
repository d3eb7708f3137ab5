use crate::model::{ApprovalStatus, Status};
use std::fmt;

/// Machine-readable error codes for API collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    TaskNotFound,
    ProjectNotFound,
    ValidationFailed,
    InvalidTransition,
    PermissionDenied,
    AuditWriteFailed,
    AggregationRunConflict,
    SweepLockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::TaskNotFound => "E2001",
            Self::ProjectNotFound => "E2002",
            Self::ValidationFailed => "E2003",
            Self::InvalidTransition => "E2004",
            Self::PermissionDenied => "E2005",
            Self::AuditWriteFailed => "E3001",
            Self::AggregationRunConflict => "E4001",
            Self::SweepLockContention => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and API responses.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::TaskNotFound => "Task not found",
            Self::ProjectNotFound => "Project not found",
            Self::ValidationFailed => "Request validation failed",
            Self::InvalidTransition => "Invalid workflow transition",
            Self::PermissionDenied => "Actor lacks project-head or admin role",
            Self::AuditWriteFailed => "Audit trail append failed",
            Self::AggregationRunConflict => "Aggregation already running for this window",
            Self::SweepLockContention => "Retention sweep lock held elsewhere",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in worktrail.toml and retry."),
            Self::TaskNotFound | Self::ProjectNotFound => None,
            Self::ValidationFailed => Some("Check required fields and date ordering."),
            Self::InvalidTransition => {
                Some("Re-read the entity; its workflow state moved under you.")
            }
            Self::PermissionDenied => {
                Some("Only the project head or a workspace admin may decide approvals.")
            }
            Self::AuditWriteFailed => Some("Check disk space; the primary mutation still applied."),
            Self::AggregationRunConflict => {
                Some("Wait for the in-flight run to finish; runs are not queued.")
            }
            Self::SweepLockContention => Some("Retry after the other sweep releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Workflow state the entity was in when a transition was refused.
///
/// Every user-visible workflow failure carries this so the caller can
/// reconcile without an extra read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentState {
    pub status: Status,
    pub approval_status: ApprovalStatus,
}

impl fmt::Display for CurrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status={} approval={}", self.status, self.approval_status)
    }
}

/// Errors surfaced by the workflow state machine and trail queries.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("task '{0}' not found")]
    TaskNotFound(String),

    #[error("project '{0}' not found")]
    ProjectNotFound(String),

    /// Malformed request, rejected before anything is persisted.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// A guard failed; the entity is untouched.
    #[error("invalid transition '{attempted}' ({state})")]
    InvalidTransition {
        attempted: &'static str,
        state: CurrentState,
    },

    /// Actor may not decide approvals for this task's project.
    #[error("actor '{actor}' may not perform '{attempted}' ({state})")]
    PermissionDenied {
        actor: String,
        attempted: &'static str,
        state: CurrentState,
    },

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

impl WorkflowError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::TaskNotFound(_) => ErrorCode::TaskNotFound,
            Self::ProjectNotFound(_) => ErrorCode::ProjectNotFound,
            Self::Validation { .. } => ErrorCode::ValidationFailed,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::Storage(_) => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
