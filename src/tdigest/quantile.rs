//! Quantile evaluation for `TDigest`.
//!
//! - **Index mapping**: `q ∈ [0,1]` maps to a target cumulative weight `t = q·N`.
//! - **Center-to-center spans**: each centroid's center sits half its weight past
//!   its left boundary; between adjacent centroids the span weight is
//!   `(w_left + w_right)/2` and the result is linear in weight across it.
//! - **Edge half-centroids**: below the first center interpolate `min → mean[0]`,
//!   above the last center interpolate `mean[last] → max`.
//!
//! # Guarantees
//! - `quantile(0.0) == min()` and `quantile(1.0) == max()` exactly.
//! - Monotone in `q`, and always inside `[min, max]`.
//!
//! # Edge cases
//! - **Empty digest** → `Err(EmptyDigest)`.
//! - **`q` NaN or outside `[0,1]`** → `Err(InvalidParameter)`.

use crate::tdigest::centroids::Centroid;
use crate::tdigest::TDigest;
use crate::{TdError, TdResult};

impl TDigest {
    /// Estimate the value below which a fraction `q` of the total weight falls.
    ///
    /// Compresses pending samples first.
    pub fn quantile(&mut self, q: f64) -> TdResult<f64> {
        if !(0.0..=1.0).contains(&q) {
            return Err(TdError::invalid(
                "quantile",
                format!("must be in [0, 1] (got {q})"),
            ));
        }
        self.prepare_query()?;
        Ok(quantile_of(
            self.centroids(),
            self.total_weight(),
            self.min(),
            self.max(),
            q,
        ))
    }

    /// Median shorthand, `quantile(0.5)`.
    pub fn median(&mut self) -> TdResult<f64> {
        self.quantile(0.5)
    }
}

/// Pure kernel over a compressed, non-empty centroid list.
pub(crate) fn quantile_of(cents: &[Centroid], total_w: f64, min: f64, max: f64, q: f64) -> f64 {
    debug_assert!(!cents.is_empty());
    if q <= 0.0 {
        return min;
    }
    if q >= 1.0 {
        return max;
    }
    let index = q * total_w;

    // Left half of the first centroid: min → mean[0].
    let first = cents[0];
    let half_first = first.weight() / 2.0;
    if index < half_first {
        return lerp(min, first.mean(), index / half_first).clamp(min, max);
    }

    // Right half of the last centroid: mean[last] → max.
    let last = cents[cents.len() - 1];
    let half_last = last.weight() / 2.0;
    if index > total_w - half_last {
        let into = (index - (total_w - half_last)) / half_last;
        return lerp(last.mean(), max, into).clamp(min, max);
    }
    if cents.len() == 1 {
        return first.mean().clamp(min, max);
    }

    let (left_idx, left_center_cum_w, span_w) = find_bracketing_centroids(cents, index);
    let (left, right) = (cents[left_idx], cents[left_idx + 1]);
    let frac = if span_w > 0.0 {
        ((index - left_center_cum_w) / span_w).clamp(0.0, 1.0)
    } else {
        0.5
    };
    lerp(left.mean(), right.mean(), frac).clamp(min, max)
}

/// Find the adjacent pair whose center-to-center span contains `index`.
///
/// Returns `(left_idx, cumulative_weight_at_left_center, center_span_weight)`.
/// Callers guarantee `w0/2 <= index <= N - w_last/2`, so a single centroid never
/// reaches here.
fn find_bracketing_centroids(cents: &[Centroid], index: f64) -> (usize, f64, f64) {
    let mut cum_w_at_left_center = cents[0].weight() / 2.0;
    for left_idx in 0..(cents.len() - 1) {
        let span = (cents[left_idx].weight() + cents[left_idx + 1].weight()) / 2.0;
        if cum_w_at_left_center + span >= index {
            return (left_idx, cum_w_at_left_center, span);
        }
        cum_w_at_left_center += span;
    }
    // Rounding can leave `index` a hair past the last center; use the last pair.
    let m = cents.len();
    let span = (cents[m - 2].weight() + cents[m - 1].weight()) / 2.0;
    (m - 2, cum_w_at_left_center - span, span)
}

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}
