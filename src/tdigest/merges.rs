use crate::tdigest::centroids::Centroid;
use std::iter::Peekable;

/// Merge stream that interleaves existing centroids with sorted raw `(value, weight)`
/// samples, yielding every point as a centroid in non-decreasing mean order.
///
/// Ties resolve in insertion order: an existing centroid was folded in before any
/// buffered sample, so it is emitted first, and samples keep their (stable) sort order.
pub(crate) struct MergeByMean<'a> {
    centroids: Peekable<std::slice::Iter<'a, Centroid>>,
    samples: Peekable<std::slice::Iter<'a, (f64, f64)>>,
}

impl<'a> MergeByMean<'a> {
    pub(crate) fn from_centroids_and_samples(
        centroids: &'a [Centroid],
        sorted_samples: &'a [(f64, f64)],
    ) -> Self {
        Self {
            centroids: centroids.iter().peekable(),
            samples: sorted_samples.iter().peekable(),
        }
    }

    #[inline]
    fn next_sample(&mut self) -> Option<Centroid> {
        self.samples.next().copied().map(Centroid::from_sample)
    }
}

impl Iterator for MergeByMean<'_> {
    type Item = Centroid;

    fn next(&mut self) -> Option<Self::Item> {
        match (self.centroids.peek(), self.samples.peek()) {
            (Some(c), Some(&&(v, _))) => {
                if c.mean() <= v {
                    self.centroids.next().copied()
                } else {
                    self.next_sample()
                }
            }
            (Some(_), None) => self.centroids.next().copied(),
            (None, Some(_)) => self.next_sample(),
            (None, None) => None,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.centroids.len() + self.samples.len();
        (n, Some(n))
    }
}

/// Stable sort of buffered samples by value (equal values keep insertion order).
#[inline]
pub(crate) fn sort_samples(samples: &mut [(f64, f64)]) {
    samples.sort_by(|a, b| a.0.total_cmp(&b.0));
}
