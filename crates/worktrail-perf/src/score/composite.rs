use serde::{Deserialize, Serialize};
use worktrail_core::config::ScoringConfig;

/// Raw metric values used to compute one user's productivity score.
///
/// All components are on a 0-100 scale. Fields are clamped to `[0, 100]` by
/// [`composite_score`]; callers pre-normalize the velocity cohort with
/// [`normalize_metric`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreInputs {
    pub approval_rate: f64,
    pub on_time_rate: f64,
    pub velocity_normalized: f64,
    pub quality_score: f64,
}

/// Compute the weighted productivity score:
///
/// `score = w.approval*AR + w.on_time*OT + w.velocity*VN + w.quality*Q`
///
/// With the shipped weights (0.4/0.3/0.2/0.1) the output stays inside
/// `[0, 100]`; it is clamped regardless so overridden weights cannot leak
/// out-of-range scores into rankings.
#[must_use]
pub fn composite_score(inputs: &ScoreInputs, weights: &ScoringConfig) -> f64 {
    let ar = normalize_component(inputs.approval_rate);
    let ot = normalize_component(inputs.on_time_rate);
    let vn = normalize_component(inputs.velocity_normalized);
    let q = normalize_component(inputs.quality_score);

    let score = (weights.approval * ar) + (weights.on_time * ot) + (weights.velocity * vn) + (weights.quality * q);
    score.clamp(0.0, 100.0)
}

/// Min-max normalization that maps raw metric values to `[0, 100]`.
///
/// If all values are equal (including a single-element slice), all outputs
/// are `0.0`.
#[must_use]
pub fn normalize_metric(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if !range.is_finite() || range.abs() <= f64::EPSILON {
        return vec![0.0; values.len()];
    }

    values
        .iter()
        .map(|&value| normalize_component((value - min) / range * 100.0))
        .collect()
}

fn normalize_component(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }

    value.clamp(0.0, 100.0)
}
