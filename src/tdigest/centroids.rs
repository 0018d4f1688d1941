use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A centroid summarizes a cluster of raw samples as one weighted point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Centroid {
    mean: OrderedFloat<f64>,
    weight: OrderedFloat<f64>,
}

impl PartialOrd for Centroid {
    fn partial_cmp(&self, other: &Centroid) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Centroid {
    fn cmp(&self, other: &Centroid) -> Ordering {
        self.mean.cmp(&other.mean)
    }
}

impl Centroid {
    #[inline]
    pub fn new(mean: f64, weight: f64) -> Self {
        debug_assert!(weight > 0.0, "centroid weight must be positive");
        Centroid {
            mean: OrderedFloat::from(mean),
            weight: OrderedFloat::from(weight),
        }
    }

    #[inline]
    pub fn mean(&self) -> f64 {
        self.mean.into_inner()
    }
    #[inline]
    pub fn weight(&self) -> f64 {
        self.weight.into_inner()
    }

    /// Pull `other` into this centroid: weights add, the mean moves to the weighted mean.
    ///
    /// The new mean never leaves `[min(m0, m1), max(m0, m1)]`, so centroids stay
    /// inside the digest's exact extrema.
    #[inline]
    pub fn absorb(&mut self, other: Centroid) {
        let (m0, m1) = (self.mean(), other.mean());
        let (w0, w1) = (self.weight(), other.weight());
        let w = w0 + w1;
        let delta = m1 - m0;
        // incremental form keeps equal means exactly equal
        let mean = if delta.is_finite() {
            m0 + delta * (w1 / w)
        } else {
            m0 * (w0 / w) + m1 * (w1 / w)
        };
        self.mean = OrderedFloat::from(mean.clamp(m0.min(m1), m0.max(m1)));
        self.weight = OrderedFloat::from(w);
    }

    /// A raw `(value, weight)` sample viewed as a singleton centroid.
    #[inline]
    pub fn from_sample(sample: (f64, f64)) -> Self {
        Centroid::new(sample.0, sample.1)
    }
}

/* ===========================
 * Slice helpers
 * =========================== */

/// Non-strictly increasing by mean (allows equal means).
#[inline]
pub fn is_sorted_by_mean(cs: &[Centroid]) -> bool {
    cs.windows(2).all(|w| w[0].mean() <= w[1].mean())
}

/// Sum of centroid weights.
#[inline]
pub fn total_weight(cs: &[Centroid]) -> f64 {
    cs.iter().map(Centroid::weight).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_moves_to_weighted_mean() {
        let mut c = Centroid::new(1.0, 1.0);
        c.absorb(Centroid::new(3.0, 3.0));
        assert_eq!(c.weight(), 4.0);
        assert_eq!(c.mean(), 2.5);

        let mut same = Centroid::new(0.1, 2.0);
        same.absorb(Centroid::from_sample((0.1, 5.0)));
        assert_eq!(same.mean(), 0.1);
        assert_eq!(same.weight(), 7.0);
    }

    #[test]
    fn absorb_stays_between_the_two_means() {
        let mut wide = Centroid::new(-1e308, 1.0);
        wide.absorb(Centroid::new(1e308, 1.0));
        assert_eq!(wide.mean(), 0.0);

        let cases = [
            (0.1, 1e-300, 0.30000000000000004, 1e300),
            (1e15, 3.0, 1e15 + 2.0, 7.0),
            (-2.5, 1e20, -2.5000000000000004, 1.0),
            (1.0 / 3.0, 1.0, 2.0 / 3.0, 1e-12),
        ];
        for (m0, w0, m1, w1) in cases {
            let mut c = Centroid::new(m0, w0);
            c.absorb(Centroid::new(m1, w1));
            assert!(
                c.mean() >= m0.min(m1) && c.mean() <= m0.max(m1),
                "mean {} escaped [{m0}, {m1}]",
                c.mean()
            );
        }
    }

    #[test]
    fn ordering_is_by_mean_only() {
        let a = Centroid::new(1.0, 10.0);
        let b = Centroid::new(2.0, 1.0);
        assert!(a < b);
        assert!(is_sorted_by_mean(&[a, a, b]));
        assert!(!is_sorted_by_mean(&[b, a]));
    }
}
