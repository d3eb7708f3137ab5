//! Snapshot-to-snapshot trend deltas.

use worktrail_core::model::{PerformanceMetrics, Trends};

/// Percent delta of each tracked metric against a prior snapshot's values.
///
/// `100 * (new - old) / old` per metric. A zero baseline can't produce a
/// meaningful percentage: the delta is 0 when the metric stayed at zero and
/// pinned to 100 when it appeared from nothing.
#[must_use]
pub fn trends_against(current: &PerformanceMetrics, prior: &PerformanceMetrics) -> Trends {
    let prior_named = prior.named();
    current
        .named()
        .into_iter()
        .map(|(name, new)| {
            let old = prior_named.get(name).copied().unwrap_or(0.0);
            (name.to_string(), percent_delta(old, new))
        })
        .collect()
}

fn percent_delta(old: f64, new: f64) -> f64 {
    if old.abs() <= f64::EPSILON {
        if new.abs() <= f64::EPSILON { 0.0 } else { 100.0 }
    } else {
        round2((new - old) / old * 100.0)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
