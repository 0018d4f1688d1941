//! CDF (cumulative distribution function) evaluation for `TDigest`.
//!
//! Allocation-lean kernel over the centroid slice. A single `prefix` vector of
//! running weight sums is built per call and shared by every query point.
//!
//! # Semantics
//! - **Outside support**: strictly below `min` → `0`, strictly above `max` → `1`.
//! - **Tails**: linear ramps `min → mean[0]` and `mean[last] → max`, where the
//!   edge centroid contributes **half** its weight.
//! - **Exact hit on a mean**: midpoint mass of the run of centroids sharing it.
//! - **Between centroids**: center-to-center interpolation.
//!
//! # Edge cases
//! - **Empty digest** → `Err(EmptyDigest)`.
//! - **NaN query point** → `Err(InvalidParameter)`.
//! - A digest whose `min == max` answers `0.5` at that single point.

use rayon::prelude::*;

use crate::tdigest::centroids::Centroid;
use crate::tdigest::TDigest;
use crate::{TdError, TdResult};

/// Crossover for parallel evaluation with Rayon.
///
/// Rayon setup has a fixed cost; below this size a scalar loop is faster.
const PAR_MIN: usize = 32_768;

impl TDigest {
    /// Estimate the fraction of total weight at or below `x`, in **[0, 1]**.
    ///
    /// Compresses pending samples first.
    pub fn cdf(&mut self, x: f64) -> TdResult<f64> {
        Ok(self.cdf_many(&[x])?[0])
    }

    /// Batch form of [`TDigest::cdf`]; the prefix table is built once per call.
    pub fn cdf_many(&mut self, xs: &[f64]) -> TdResult<Vec<f64>> {
        if xs.iter().any(|x| x.is_nan()) {
            return Err(TdError::invalid("cdf value", "must not be NaN"));
        }
        self.prepare_query()?;

        let cents = self.centroids();
        let mut prefix: Vec<f64> = Vec::with_capacity(cents.len() + 1);
        let mut run = 0.0_f64;
        prefix.push(run);
        for c in cents {
            run += c.weight();
            prefix.push(run);
        }
        let (min_v, max_v) = (self.min(), self.max());

        let out = if xs.len() >= PAR_MIN {
            xs.par_iter()
                .with_min_len(4096)
                .map(|&v| cdf_at_val(v, cents, &prefix, min_v, max_v))
                .collect()
        } else {
            xs.iter()
                .map(|&v| cdf_at_val(v, cents, &prefix, min_v, max_v))
                .collect()
        };
        Ok(out)
    }
}

/* ------------------------- PRIVATE KERNEL ------------------------- */

#[inline]
fn cdf_at_val(val: f64, cents: &[Centroid], prefix: &[f64], min_v: f64, max_v: f64) -> f64 {
    if val < min_v {
        return 0.0;
    }
    if val > max_v {
        return 1.0;
    }
    if min_v == max_v {
        return 0.5;
    }

    let n = cents.len();
    let total = prefix[n];
    let lo = cents.partition_point(|c| c.mean() < val);
    let hi = cents.partition_point(|c| c.mean() <= val);

    let cum = if hi > lo {
        // Exact hit: midpoint mass of the equal-mean run.
        prefix[lo] + 0.5 * (prefix[hi] - prefix[lo])
    } else if lo == 0 {
        // min <= val < mean[0]
        let c0 = cents[0];
        let gap = c0.mean() - min_v;
        if gap > 0.0 {
            (val - min_v) / gap * (c0.weight() / 2.0)
        } else {
            0.0
        }
    } else if lo == n {
        // mean[last] < val <= max
        let cl = cents[n - 1];
        let gap = max_v - cl.mean();
        let half = cl.weight() / 2.0;
        if gap > 0.0 {
            total - half + (val - cl.mean()) / gap * half
        } else {
            total
        }
    } else {
        let (l, r) = (cents[lo - 1], cents[lo]);
        let gap = r.mean() - l.mean();
        let span = 0.5 * (l.weight() + r.weight());
        prefix[lo - 1] + 0.5 * l.weight() + (val - l.mean()) / gap * span
    };
    (cum / total).clamp(0.0, 1.0)
}
