#![forbid(unsafe_code)]
//! worktrail-perf library.
//!
//! Periodic performance aggregation over worktrail's task state and audit
//! trail: per-user window metrics, the weighted productivity score,
//! workspace rankings, and snapshot trends.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` at the repository seams, a typed
//!   [`worker::AggregationError`] from the worker.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).

pub mod metrics;
pub mod rank;
pub mod repo;
pub mod score;
pub mod worker;

pub use metrics::{UserWindow, WindowMetrics, trends_against};
pub use rank::rank_users;
pub use repo::{RunLock, SnapshotStore, TaskSource, TrailSource};
pub use score::{ScoreInputs, composite_score, normalize_metric};
pub use worker::{
    AggregationError, Aggregator, EmployeeList, EmployeeSummary, SortBy, SortOrder,
};
