//! Dynamic time warping over feature-vector sequences
//!
//! Aligns a live utterance against an enrolled template so the same phrase
//! spoken faster or slower still scores well. Cost is the standard monotonic
//! DP recurrence over Euclidean frame distances, normalized by the combined
//! sequence length so scores are comparable across template lengths.

use crate::{Error, Result};

/// Euclidean distance between two feature vectors
fn frame_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Minimum-cost monotonic alignment between `live` and `template`
///
/// Returns the accumulated path cost normalized by `(N + M)`. Identical
/// sequences cost 0.
///
/// # Errors
///
/// Returns [`Error::EmptyInput`] if either sequence is empty: an empty
/// template must fail rather than produce a spuriously high score.
#[allow(clippy::cast_precision_loss)]
pub fn alignment_cost(live: &[Vec<f32>], template: &[Vec<f32>]) -> Result<f32> {
    if live.is_empty() {
        return Err(Error::EmptyInput("live sequence is empty"));
    }
    if template.is_empty() {
        return Err(Error::EmptyInput("template sequence is empty"));
    }

    let (m, n) = (live.len(), template.len());

    // Rolling two-row DP: D[i][j] = dist(i,j) + min(D[i-1][j], D[i][j-1], D[i-1][j-1])
    let mut prev = vec![f32::INFINITY; n + 1];
    let mut curr = vec![f32::INFINITY; n + 1];
    prev[0] = 0.0;

    for i in 1..=m {
        curr[0] = f32::INFINITY;
        for j in 1..=n {
            let d = frame_distance(&live[i - 1], &template[j - 1]);
            curr[j] = d + prev[j].min(curr[j - 1]).min(prev[j - 1]);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    Ok(prev[n] / (m + n) as f32)
}

/// Convert an alignment cost to a similarity in `(0, 1]`
#[must_use]
pub fn similarity(cost: f32) -> f32 {
    1.0 / (1.0 + cost)
}
