use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration, loaded from `worktrail.toml`.
///
/// Every field has a default so a missing or empty file yields a working
/// configuration; unknown keys are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub audit: AuditConfig,
    pub scoring: ScoringConfig,
}

/// Audit trail retention and sweep tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Entries older than this are hard-deleted by the retention sweep.
    pub retention_days: u32,
    /// Rows deleted per sweep batch; the sweep checks for cancellation
    /// between batches.
    pub sweep_batch_size: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            sweep_batch_size: default_sweep_batch(),
        }
    }
}

/// Weights of the productivity score composite.
///
/// `score = approval*approval_rate + on_time*on_time_rate +
/// velocity*velocity_normalized + quality*quality_score`, clamped to
/// `[0, 100]`. The shipped weights are a documented contract; changing them
/// invalidates snapshot-to-snapshot trend comparisons.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub approval: f64,
    pub on_time: f64,
    pub velocity: f64,
    pub quality: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            approval: 0.4,
            on_time: 0.3,
            velocity: 0.2,
            quality: 0.1,
        }
    }
}

const fn default_retention_days() -> u32 {
    730
}

const fn default_sweep_batch() -> u32 {
    500
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }
}
