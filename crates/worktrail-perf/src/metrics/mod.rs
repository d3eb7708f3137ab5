//! Per-user metric derivation.

pub mod trends;
pub mod window;

pub use trends::trends_against;
pub use window::{UserWindow, WindowMetrics};
