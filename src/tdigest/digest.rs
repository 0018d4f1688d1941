// src/tdigest/digest.rs
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tdigest::centroids::{is_sorted_by_mean, Centroid};
use crate::tdigest::compressor::compress_into;
use crate::tdigest::merges::{sort_samples, MergeByMean};
use crate::tdigest::scale::ScaleFamily;
use crate::{TdError, TdResult};

/// `min()` reported by a digest holding no weight.
pub const EMPTY_MIN: f64 = f64::MAX;
/// `max()` reported by a digest holding no weight.
pub const EMPTY_MAX: f64 = f64::MIN;

/// Buffered samples per unit of compression before an automatic compression pass.
const BUFFER_FACTOR: f64 = 5.0;
/// Total nodes (centroids + buffer) per unit of compression, used for memory accounting.
const NODE_FACTOR: f64 = 6.0;
const CAPACITY_SLACK: usize = 10;

/// Largest accepted compression. Buffer and node capacities scale linearly with it.
pub const MAX_COMPRESSION: f64 = 100_000.0;

/// A buffered-merging t-digest.
///
/// Raw `(value, weight)` samples land in an unmerged buffer and are folded into the
/// mean-ordered centroid list by the compressor, either when the buffer fills up or
/// lazily before a query. `min`/`max` are tracked exactly, never approximated.
#[derive(Debug, PartialEq, Clone)]
pub struct TDigest {
    compression: f64,
    scale: ScaleFamily,
    centroids: Vec<Centroid>,
    unmerged: Vec<(f64, f64)>,
    min: f64,
    max: f64,
    merged_weight: f64,
    unmerged_weight: f64,
    total_compressions: u64,
}

/// Snapshot of a digest's bookkeeping, as reported by `TDIGEST.INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DigestInfo {
    pub compression: f64,
    pub merged_nodes: usize,
    pub unmerged_nodes: usize,
    pub merged_weight: f64,
    pub unmerged_weight: f64,
    pub total_compressions: u64,
}

/* =============================================================================
 * Builder
 * ============================================================================= */

/// Builder for [`TDigest`].
#[derive(Debug, Clone)]
pub struct TDigestBuilder {
    compression: f64,
    scale: ScaleFamily,
}

impl Default for TDigestBuilder {
    fn default() -> Self {
        Self {
            compression: 100.0,
            scale: ScaleFamily::K1,
        }
    }
}

impl TDigestBuilder {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression parameter (memory/accuracy trade-off).
    #[inline]
    pub fn compression(mut self, c: f64) -> Self {
        self.compression = c;
        self
    }

    /// Choose the scale family used by the k-limit.
    #[inline]
    pub fn scale(mut self, s: ScaleFamily) -> Self {
        self.scale = s;
        self
    }

    /// Build an empty digest. Fails if compression is not a positive finite number.
    pub fn build(self) -> TdResult<TDigest> {
        validate_compression(self.compression)?;
        Ok(TDigest {
            compression: self.compression,
            scale: self.scale,
            centroids: Vec::new(),
            unmerged: Vec::new(),
            min: EMPTY_MIN,
            max: EMPTY_MAX,
            merged_weight: 0.0,
            unmerged_weight: 0.0,
            total_compressions: 0,
        })
    }
}

#[inline]
fn validate_compression(c: f64) -> TdResult<()> {
    if !c.is_finite() || c <= 0.0 {
        return Err(TdError::invalid(
            "compression",
            format!("must be a positive number (got {c})"),
        ));
    }
    if c > MAX_COMPRESSION {
        return Err(TdError::invalid(
            "compression",
            format!("must not exceed {MAX_COMPRESSION} (got {c})"),
        ));
    }
    Ok(())
}

/// `total + added` must stay finite so compression and the codec keep working.
#[inline]
fn validate_total(total: f64, added: f64) -> TdResult<()> {
    let after = total + added;
    if !after.is_finite() {
        return Err(TdError::invalid(
            "sample weight",
            format!("total weight would overflow (have {total}, adding {added})"),
        ));
    }
    Ok(())
}

#[inline]
fn validate_sample(value: f64, weight: f64) -> TdResult<()> {
    if !value.is_finite() {
        return Err(TdError::invalid(
            "sample value",
            format!("must be finite (got {value})"),
        ));
    }
    if !weight.is_finite() || weight <= 0.0 {
        return Err(TdError::invalid(
            "sample weight",
            format!("must be a positive finite number (got {weight})"),
        ));
    }
    Ok(())
}

#[inline]
fn buffer_capacity(compression: f64) -> usize {
    // float-to-int `as` saturates
    ((BUFFER_FACTOR * compression).ceil() as usize).saturating_add(CAPACITY_SLACK)
}

#[inline]
fn node_capacity(compression: f64) -> usize {
    ((NODE_FACTOR * compression).ceil() as usize).saturating_add(CAPACITY_SLACK)
}

/* =============================================================================
 * Digest
 * ============================================================================= */

impl TDigest {
    /// Empty digest with the default (arcsine) scale.
    pub fn new(compression: f64) -> TdResult<TDigest> {
        Self::builder().compression(compression).build()
    }

    /// Entry point for fluent construction.
    #[inline]
    pub fn builder() -> TDigestBuilder {
        TDigestBuilder::default()
    }

    /// Reassemble a digest from decoded parts. The codec validates before calling.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        compression: f64,
        scale: ScaleFamily,
        centroids: Vec<Centroid>,
        unmerged: Vec<(f64, f64)>,
        min: f64,
        max: f64,
        merged_weight: f64,
        unmerged_weight: f64,
        total_compressions: u64,
    ) -> TDigest {
        TDigest {
            compression,
            scale,
            centroids,
            unmerged,
            min,
            max,
            merged_weight,
            unmerged_weight,
            total_compressions,
        }
    }

    #[inline]
    pub fn compression(&self) -> f64 {
        self.compression
    }

    #[inline]
    pub fn scale(&self) -> ScaleFamily {
        self.scale
    }

    /// Smallest value ever added, or [`EMPTY_MIN`] when the digest holds no weight.
    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Largest value ever added, or [`EMPTY_MAX`] when the digest holds no weight.
    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Borrow the compressed centroids (excludes buffered samples).
    #[inline]
    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    /// Borrow the buffered `(value, weight)` samples in insertion order.
    #[inline]
    pub fn unmerged(&self) -> &[(f64, f64)] {
        &self.unmerged
    }

    #[inline]
    pub fn merged_weight(&self) -> f64 {
        self.merged_weight
    }

    #[inline]
    pub fn unmerged_weight(&self) -> f64 {
        self.unmerged_weight
    }

    /// Merged plus unmerged weight.
    #[inline]
    pub fn total_weight(&self) -> f64 {
        self.merged_weight + self.unmerged_weight
    }

    #[inline]
    pub fn total_compressions(&self) -> u64 {
        self.total_compressions
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty() && self.unmerged.is_empty()
    }

    /// Buffered samples that trigger an automatic compression.
    #[inline]
    pub fn buffer_capacity(&self) -> usize {
        buffer_capacity(self.compression)
    }

    /// Reported footprint in bytes.
    ///
    /// Derived from the node capacity implied by `compression`, not from the
    /// allocator's view of the vectors, so a digest and its decoded copy report
    /// the same size.
    pub fn memory_usage(&self) -> usize {
        node_capacity(self.compression)
            .saturating_mul(std::mem::size_of::<Centroid>())
            .saturating_add(std::mem::size_of::<Self>())
    }

    pub fn info(&self) -> DigestInfo {
        DigestInfo {
            compression: self.compression,
            merged_nodes: self.centroids.len(),
            unmerged_nodes: self.unmerged.len(),
            merged_weight: self.merged_weight,
            unmerged_weight: self.unmerged_weight,
            total_compressions: self.total_compressions,
        }
    }

    /* ===========================
     * Mutation
     * =========================== */

    /// Add one weighted observation.
    ///
    /// Fails without touching the digest if `value` is not finite, `weight` is not
    /// a positive finite number, or the total weight would overflow. Compresses
    /// synchronously once the buffer is full.
    pub fn add(&mut self, value: f64, weight: f64) -> TdResult<()> {
        validate_sample(value, weight)?;
        validate_total(self.total_weight(), weight)?;
        self.push_sample(value, weight);
        Ok(())
    }

    /// Add a batch of observations; the whole batch is validated before any is applied.
    pub fn add_many(&mut self, samples: &[(f64, f64)]) -> TdResult<()> {
        let mut batch_w = 0.0;
        for &(v, w) in samples {
            validate_sample(v, w)?;
            validate_total(self.total_weight(), batch_w + w)?;
            batch_w += w;
        }
        for &(v, w) in samples {
            self.push_sample(v, w);
        }
        Ok(())
    }

    fn push_sample(&mut self, value: f64, weight: f64) {
        if self.total_weight() > 0.0 {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        } else {
            self.min = value;
            self.max = value;
        }
        self.unmerged.push((value, weight));
        self.unmerged_weight += weight;
        if self.unmerged.len() >= self.buffer_capacity() {
            debug!(
                buffered = self.unmerged.len(),
                compression = self.compression,
                "buffer full, compressing"
            );
            self.compress();
        }
    }

    /// Fold the unmerged buffer into the centroid list. No-op if the buffer is empty.
    pub fn compress(&mut self) {
        if self.unmerged.is_empty() {
            return;
        }
        sort_samples(&mut self.unmerged);
        let total_w = self.total_weight();
        let stream = MergeByMean::from_centroids_and_samples(&self.centroids, &self.unmerged);
        let compressed = compress_into(stream, total_w, self.compression, self.scale);

        debug_assert!(is_sorted_by_mean(&compressed));
        self.centroids = compressed;
        self.unmerged.clear();
        self.merged_weight = total_w;
        self.unmerged_weight = 0.0;
        self.total_compressions += 1;
    }

    /// Fold `other`'s content into `self` without mutating `other`.
    ///
    /// Every source centroid and buffered sample is fed through the same path as
    /// [`TDigest::add`], so compression triggers as usual. The exact extrema of
    /// `other` widen `self`'s, since centroid means alone would under-report them.
    ///
    /// Fails without touching either digest if the combined weight would overflow.
    pub fn merge(&mut self, other: &TDigest) -> TdResult<()> {
        if other.total_weight() <= 0.0 {
            return Ok(());
        }
        validate_total(self.total_weight(), other.total_weight())?;
        let (other_min, other_max) = (other.min, other.max);
        for c in &other.centroids {
            self.push_sample(c.mean(), c.weight());
        }
        for &(v, w) in &other.unmerged {
            self.push_sample(v, w);
        }
        self.min = self.min.min(other_min);
        self.max = self.max.max(other_max);
        Ok(())
    }

    /// Drop all data; compression, scale and the lifetime compression counter are kept.
    pub fn reset(&mut self) {
        self.centroids.clear();
        self.unmerged.clear();
        self.min = EMPTY_MIN;
        self.max = EMPTY_MAX;
        self.merged_weight = 0.0;
        self.unmerged_weight = 0.0;
    }

    /// Compress if needed and fail on a digest holding no weight.
    pub(crate) fn prepare_query(&mut self) -> TdResult<()> {
        self.compress();
        if self.centroids.is_empty() {
            return Err(TdError::EmptyDigest);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tdigest::test_helpers::assert_exact;

    #[test]
    fn rejects_non_positive_compression() {
        for c in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                TDigest::new(c),
                Err(TdError::InvalidParameter {
                    context: "compression",
                    ..
                })
            ));
        }
        assert!(TDigest::new(0.5).is_ok());
    }

    #[test]
    fn rejects_compression_above_ceiling() {
        for c in [MAX_COMPRESSION * 2.0, 1e9, 1e18, f64::MAX] {
            assert!(matches!(
                TDigest::new(c),
                Err(TdError::InvalidParameter {
                    context: "compression",
                    ..
                })
            ));
        }
        let mut td = TDigest::new(MAX_COMPRESSION).unwrap();
        td.add(1.0, 1.0).unwrap();
        assert!(td.buffer_capacity() > 0);
        assert!(td.memory_usage() > TDigest::new(100.0).unwrap().memory_usage());
    }

    #[test]
    fn overflowing_total_weight_is_rejected() {
        let mut td = TDigest::new(100.0).unwrap();
        td.add(1.0, 1e308).unwrap();
        let before = td.clone();
        assert!(matches!(
            td.add(2.0, 1e308),
            Err(TdError::InvalidParameter {
                context: "sample weight",
                ..
            })
        ));
        assert!(td.add_many(&[(2.0, 5e307), (3.0, 5e307)]).is_err());
        assert_eq!(td, before);

        td.add(3.0, 5e307).unwrap();
        assert!(td.total_weight().is_finite());
        assert!(td.quantile(0.5).unwrap().is_finite());
        assert!(td.cdf(2.0).unwrap().is_finite());
    }

    #[test]
    fn merge_refuses_overflowing_weight() {
        let mut to = TDigest::new(100.0).unwrap();
        to.add(1.0, 1e308).unwrap();
        let mut from = TDigest::new(100.0).unwrap();
        from.add(5.0, 1e308).unwrap();
        let before = to.clone();
        assert!(matches!(
            to.merge(&from),
            Err(TdError::InvalidParameter { .. })
        ));
        assert_eq!(to, before);
    }

    #[test]
    fn fresh_digest_reports_sentinels() {
        let td = TDigest::new(100.0).unwrap();
        assert_exact("min", EMPTY_MIN, td.min());
        assert_exact("max", EMPTY_MAX, td.max());
        let info = td.info();
        assert_eq!(info.merged_nodes, 0);
        assert_eq!(info.unmerged_nodes, 0);
        assert_eq!(info.compression, 100.0);
        assert!(td.is_empty());
    }

    #[test]
    fn add_validates_before_mutating() {
        let mut td = TDigest::new(100.0).unwrap();
        td.add(1.0, 1.0).unwrap();
        let before = td.clone();
        assert!(td.add(2.0, 0.0).is_err());
        assert!(td.add(2.0, -3.0).is_err());
        assert!(td.add(f64::NAN, 1.0).is_err());
        assert!(td.add(f64::INFINITY, 1.0).is_err());
        assert!(td.add(2.0, f64::INFINITY).is_err());
        assert!(td.add_many(&[(3.0, 1.0), (4.0, 0.0)]).is_err());
        assert_eq!(td, before);
    }

    #[test]
    fn hundred_points_stay_buffered_then_reset_clears() {
        let mut td = TDigest::new(100.0).unwrap();
        for i in 0..100 {
            td.add(i as f64 * 0.37, 1.0).unwrap();
        }
        assert_eq!(td.info().unmerged_nodes, 100);
        assert_eq!(td.info().merged_nodes, 0);
        td.reset();
        assert_eq!(td.info().unmerged_nodes, 0);
        assert_eq!(td.info().merged_nodes, 0);
        assert_exact("min", EMPTY_MIN, td.min());
        assert_exact("max", EMPTY_MAX, td.max());
        assert_eq!(td.compression(), 100.0);
    }

    #[test]
    fn buffer_never_exceeds_capacity() {
        let mut td = TDigest::new(10.0).unwrap();
        let cap = td.buffer_capacity();
        for i in 0..(cap * 3) {
            td.add(i as f64, 1.0).unwrap();
            assert!(td.unmerged().len() < cap);
        }
        assert!(td.total_compressions() >= 3);
        assert_eq!(td.total_weight(), (cap * 3) as f64);
    }

    #[test]
    fn min_max_are_exact() {
        let mut td = TDigest::new(100.0).unwrap();
        for x in 1..=100 {
            td.add(x as f64, 1.0).unwrap();
        }
        assert_exact("min", 1.0, td.min());
        assert_exact("max", 100.0, td.max());
    }

    #[test]
    fn negative_first_sample_sets_both_extrema() {
        let mut td = TDigest::new(100.0).unwrap();
        td.add(-5.0, 2.0).unwrap();
        assert_exact("min", -5.0, td.min());
        assert_exact("max", -5.0, td.max());
    }

    #[test]
    fn compress_is_idempotent() {
        let mut td = TDigest::new(50.0).unwrap();
        for i in 0..1000 {
            td.add((i as f64).sin(), 1.0 + (i % 4) as f64).unwrap();
        }
        td.compress();
        let cents = td.centroids().to_vec();
        let w = td.total_weight();
        let n = td.total_compressions();
        td.compress();
        assert_eq!(td.centroids(), &cents[..]);
        assert_exact("total weight", w, td.total_weight());
        assert_eq!(td.total_compressions(), n, "empty buffer is a no-op");
    }

    #[test]
    fn merge_conserves_weight_and_leaves_source_alone() {
        let mut to = TDigest::new(100.0).unwrap();
        let mut from = TDigest::new(100.0).unwrap();
        for _ in 0..100 {
            from.add(1.0, 1.0).unwrap();
            to.add(1.0, 10.0).unwrap();
        }
        let snapshot = from.clone();
        to.merge(&from).unwrap();
        assert_exact("total", 1100.0, to.total_weight());
        assert_eq!(from, snapshot);
    }

    #[test]
    fn merge_into_empty_copies_weight_and_extrema() {
        let mut from = TDigest::new(100.0).unwrap();
        for x in 0..5000 {
            from.add(x as f64 - 10.0, 1.0).unwrap();
        }
        let mut to = TDigest::new(100.0).unwrap();
        to.merge(&from).unwrap();
        assert_exact("total", from.total_weight(), to.total_weight());
        assert_exact("min", -10.0, to.min());
        assert_exact("max", 4989.0, to.max());
    }

    #[test]
    fn merge_of_empty_source_is_a_no_op() {
        let mut to = TDigest::new(100.0).unwrap();
        to.add(3.0, 1.0).unwrap();
        let before = to.clone();
        to.merge(&TDigest::new(20.0).unwrap()).unwrap();
        assert_eq!(to, before);
    }

    #[test]
    fn reset_keeps_lifetime_counter() {
        let mut td = TDigest::new(100.0).unwrap();
        td.add(1.0, 1.0).unwrap();
        td.compress();
        td.reset();
        assert_eq!(td.total_compressions(), 1);
        assert_eq!(td.total_weight(), 0.0);
    }

    #[test]
    fn memory_usage_depends_only_on_compression() {
        let mut a = TDigest::new(500.0).unwrap();
        let b = TDigest::new(500.0).unwrap();
        for _ in 0..100 {
            a.add(1.0, 1.0).unwrap();
        }
        assert_eq!(a.memory_usage(), b.memory_usage());
        assert!(TDigest::new(100.0).unwrap().memory_usage() < b.memory_usage());
    }
}
