//! Entity aggregates under audit: tasks and projects.
//!
//! These are the projection-level structs the store persists and the
//! workflow machine mutates. The audit trail references them by id but is
//! owned separately — deleting an entity never deletes its trail.

pub mod performance;
pub mod project;
pub mod task;

pub use performance::{
    PerformanceMetrics, PerformanceSnapshot, Period, ProjectBreakdown, Rankings, Trends,
};
pub use project::{DateChange, DateField, Project, ProjectMetrics, ProjectStatus};
pub use task::{ApprovalStatus, Priority, Rejection, Status, Task, TaskMetrics};
