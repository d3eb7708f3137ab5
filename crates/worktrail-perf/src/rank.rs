//! Workspace rankings over per-user productivity scores.

use worktrail_core::model::Rankings;

/// Rank users descending by score and compute percentiles.
///
/// Input pairs are `(user_id, score)`. Ties break by user id so repeated
/// runs over the same data produce identical rankings. Percentile is
/// `100 * (rank - 1) / (total - 1)`: 0 for the best performer, 100 for the
/// worst, and pinned to 0 for a single-member workspace.
///
/// Returns `(user_id, rankings)` in rank order.
#[must_use]
pub fn rank_users(scores: &[(String, f64)]) -> Vec<(String, Rankings)> {
    let mut ordered: Vec<(&str, f64)> = scores
        .iter()
        .map(|(user, score)| (user.as_str(), *score))
        .collect();
    ordered.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });

    let total = u32::try_from(ordered.len()).unwrap_or(u32::MAX);
    ordered
        .into_iter()
        .enumerate()
        .map(|(index, (user, _))| {
            let rank = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(1);
            (
                user.to_string(),
                Rankings {
                    rank,
                    percentile: percentile(rank, total),
                    total_in_workspace: total,
                },
            )
        })
        .collect()
}

fn percentile(rank: u32, total: u32) -> f64 {
    if total <= 1 {
        return 0.0;
    }
    100.0 * f64::from(rank - 1) / f64::from(total - 1)
}
