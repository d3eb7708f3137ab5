//! Domain event catalog for the audit trail.
//!
//! Every classified mutation maps to exactly one event type. The string
//! representation uses the `task.<verb>` / `project.<verb>` dotted format
//! stored in the audit log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The 13 task event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEvent {
    Created,
    Assigned,
    Reassigned,
    Started,
    Completed,
    SubmittedForApproval,
    Approved,
    Rejected,
    Reopened,
    DueDateChanged,
    PriorityChanged,
    StatusChanged,
    Deleted,
}

/// The 10 project event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectEvent {
    Created,
    StatusChanged,
    StartDateChanged,
    EndDateChanged,
    MemberAdded,
    MemberRemoved,
    HeadChanged,
    Completed,
    Cancelled,
    Reopened,
}

/// A typed domain event against either entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainEvent {
    Task(TaskEvent),
    Project(ProjectEvent),
}

/// Error returned when parsing an unknown event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event type '{}': expected a 'task.<verb>' or 'project.<verb>' \
             name from the event catalog",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventType {}

impl TaskEvent {
    /// All known task event types in catalog order.
    pub const ALL: [Self; 13] = [
        Self::Created,
        Self::Assigned,
        Self::Reassigned,
        Self::Started,
        Self::Completed,
        Self::SubmittedForApproval,
        Self::Approved,
        Self::Rejected,
        Self::Reopened,
        Self::DueDateChanged,
        Self::PriorityChanged,
        Self::StatusChanged,
        Self::Deleted,
    ];

    /// Return the canonical `task.<verb>` string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "task.created",
            Self::Assigned => "task.assigned",
            Self::Reassigned => "task.reassigned",
            Self::Started => "task.started",
            Self::Completed => "task.completed",
            Self::SubmittedForApproval => "task.submitted_for_approval",
            Self::Approved => "task.approved",
            Self::Rejected => "task.rejected",
            Self::Reopened => "task.reopened",
            Self::DueDateChanged => "task.due_date_changed",
            Self::PriorityChanged => "task.priority_changed",
            Self::StatusChanged => "task.status_changed",
            Self::Deleted => "task.deleted",
        }
    }
}

impl ProjectEvent {
    /// All known project event types in catalog order.
    pub const ALL: [Self; 10] = [
        Self::Created,
        Self::StatusChanged,
        Self::StartDateChanged,
        Self::EndDateChanged,
        Self::MemberAdded,
        Self::MemberRemoved,
        Self::HeadChanged,
        Self::Completed,
        Self::Cancelled,
        Self::Reopened,
    ];

    /// Return the canonical `project.<verb>` string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "project.created",
            Self::StatusChanged => "project.status_changed",
            Self::StartDateChanged => "project.start_date_changed",
            Self::EndDateChanged => "project.end_date_changed",
            Self::MemberAdded => "project.member_added",
            Self::MemberRemoved => "project.member_removed",
            Self::HeadChanged => "project.head_changed",
            Self::Completed => "project.completed",
            Self::Cancelled => "project.cancelled",
            Self::Reopened => "project.reopened",
        }
    }
}

impl DomainEvent {
    /// Canonical dotted string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task(event) => event.as_str(),
            Self::Project(event) => event.as_str(),
        }
    }

    /// The entity kind this event applies to, as stored in the trail.
    #[must_use]
    pub const fn entity_kind(self) -> &'static str {
        match self {
            Self::Task(_) => "task",
            Self::Project(_) => "project",
        }
    }
}

impl fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ProjectEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskEvent {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownEventType { raw: s.to_string() })
    }
}

impl FromStr for ProjectEvent {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownEventType { raw: s.to_string() })
    }
}

impl FromStr for DomainEvent {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("task.") {
            return TaskEvent::from_str(s).map(Self::Task);
        }
        if s.starts_with("project.") {
            return ProjectEvent::from_str(s).map(Self::Project);
        }
        Err(UnknownEventType { raw: s.to_string() })
    }
}

// Custom serde: serialize as the dotted string.
impl Serialize for DomainEvent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DomainEvent {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_covers_full_catalog() {
        assert_eq!(TaskEvent::ALL.len(), 13);
        assert_eq!(ProjectEvent::ALL.len(), 10);

        for event in TaskEvent::ALL {
            assert!(event.as_str().starts_with("task."), "{event}");
        }
        for event in ProjectEvent::ALL {
            assert!(event.as_str().starts_with("project."), "{event}");
        }
    }

    #[test]
    fn fromstr_roundtrip_all_types() {
        for event in TaskEvent::ALL {
            let parsed: DomainEvent = event.as_str().parse().expect("should parse");
            assert_eq!(parsed, DomainEvent::Task(event));
        }
        for event in ProjectEvent::ALL {
            let parsed: DomainEvent = event.as_str().parse().expect("should parse");
            assert_eq!(parsed, DomainEvent::Project(event));
        }
    }

    #[test]
    fn fromstr_rejects_unknown() {
        let err = "task.escalated".parse::<DomainEvent>().unwrap_err();
        assert_eq!(err.raw, "task.escalated");
        assert!("".parse::<DomainEvent>().is_err());
        // Bare verbs must be rejected; the kind prefix is part of the name.
        assert!("approved".parse::<DomainEvent>().is_err());
        // Kind/verb mismatch.
        assert!("project.due_date_changed".parse::<DomainEvent>().is_err());
    }

    #[test]
    fn serde_json_roundtrip() {
        for event in TaskEvent::ALL {
            let wrapped = DomainEvent::Task(event);
            let json = serde_json::to_string(&wrapped).expect("serialize");
            assert_eq!(json, format!("\"{}\"", event.as_str()));
            let deser: DomainEvent = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(deser, wrapped);
        }
    }

    #[test]
    fn entity_kind_matches_prefix() {
        assert_eq!(DomainEvent::Task(TaskEvent::Approved).entity_kind(), "task");
        assert_eq!(
            DomainEvent::Project(ProjectEvent::HeadChanged).entity_kind(),
            "project"
        );
    }
}
