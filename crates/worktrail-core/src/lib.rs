#![forbid(unsafe_code)]
//! worktrail-core library.
//!
//! Change tracking and approval workflow for a multi-tenant task tracker:
//! mutation interception, diff classification into typed domain events, an
//! append-only audit trail with TTL retention, the task approval state
//! machine, and lifecycle metrics.
//!
//! # Conventions
//!
//! - **Errors**: module error enums via `thiserror`; `anyhow::Result` with
//!   context at outer boundaries.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod intercept;
pub mod lifecycle;
pub mod model;
pub mod store;
pub mod workflow;

pub use classify::{Classification, ProjectImage, TaskImage, classify_project, classify_task};
pub use config::EngineConfig;
pub use engine::{DateChangeReport, Engine, Lifecycle};
pub use error::{CurrentState, ErrorCode, WorkflowError};
pub use event::{AuditEntry, DomainEvent, FieldChange, ProjectEvent, TaskEvent};
pub use intercept::{MutationContext, record_project_mutation, record_task_mutation};
pub use lifecycle::LifecycleMetrics;
pub use store::{Pagination, Store, SweepLock, SweepOutcome};
pub use workflow::{Actor, ReassignRequest, RejectRequest};
