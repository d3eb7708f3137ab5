//! Productivity scoring.

pub mod composite;

pub use composite::{ScoreInputs, composite_score, normalize_metric};
