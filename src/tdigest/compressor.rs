use tracing::trace;

use crate::tdigest::centroids::{is_sorted_by_mean, Centroid};
use crate::tdigest::scale::{q_to_k, ScaleFamily};

const KLIMIT_TOL: f64 = 1e-12;

/// Greedy k-limited clustering over a mean-ordered stream.
///
/// A point joins the open cluster only while `k(q_right) - k(q_left) <= 1`, where
/// `q_left` is the cumulative-weight fraction at the cluster's left edge and
/// `q_right` the fraction after absorbing the point. Otherwise the cluster closes
/// at its weighted mean and the point opens the next one.
///
/// `total_w` must be the summed weight of `items`; it is passed in because the
/// caller already tracks it and the stream is consumed only once.
pub(crate) fn klimit_merge<I>(
    items: I,
    total_w: f64,
    d: f64,
    family: ScaleFamily,
) -> Vec<Centroid>
where
    I: IntoIterator<Item = Centroid>,
{
    let items = items.into_iter();
    let hint = items.size_hint().0.min((d as usize).saturating_mul(2));
    let mut clusters: Vec<Centroid> = Vec::with_capacity(hint);
    if total_w <= 0.0 {
        return clusters;
    }

    let mut emitted_w = 0.0_f64;
    let mut k_left = q_to_k(0.0, d, family);
    let mut current: Option<Centroid> = None;

    for c in items {
        if let Some(cur) = current.as_mut() {
            let q_r = (emitted_w + cur.weight() + c.weight()) / total_w;
            let k_right = q_to_k(q_r, d, family);

            if (k_right - k_left) <= 1.0 + KLIMIT_TOL {
                cur.absorb(c);
                continue;
            }
            emitted_w += cur.weight();
            clusters.push(*cur);
            k_left = q_to_k(emitted_w / total_w, d, family);
        }
        current = Some(c);
    }
    if let Some(cur) = current {
        clusters.push(cur);
    }
    clusters
}

/// Fold a mean-ordered stream of points into a fresh centroid list.
///
/// Panics if the stream is out of order; the merge stream guarantees ordering.
pub(crate) fn compress_into<I>(
    items: I,
    total_w: f64,
    compression: f64,
    family: ScaleFamily,
) -> Vec<Centroid>
where
    I: IntoIterator<Item = Centroid>,
{
    let mut prev_mean = f64::NEG_INFINITY;
    let ordered = items.into_iter().inspect(move |c| {
        assert!(
            c.mean() >= prev_mean,
            "compress_into requires non-decreasing means; saw {} after {}",
            c.mean(),
            prev_mean
        );
        prev_mean = c.mean();
    });

    let out = klimit_merge(ordered, total_w, compression, family);

    debug_assert!(is_sorted_by_mean(&out));
    #[cfg(debug_assertions)]
    {
        let w_out: f64 = crate::tdigest::centroids::total_weight(&out);
        debug_assert!(
            (total_w - w_out).abs() <= 1e-9 * total_w.max(1.0),
            "total weight changed: in={total_w}, out={w_out}"
        );
    }
    trace!(
        centroids_out = out.len(),
        total_weight = total_w,
        compression,
        "compression pass"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(m: f64, w: f64) -> Centroid {
        Centroid::new(m, w)
    }
    fn approx(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() <= eps * (1.0 + a.abs() + b.abs())
    }

    #[test]
    fn klimit_merge_preserves_weight_and_order() {
        let items: Vec<_> = (0..1000).map(|i| c(i as f64, 1.0 + (i % 3) as f64)).collect();
        let w_in: f64 = items.iter().map(|x| x.weight()).sum();
        let out = klimit_merge(items, w_in, 50.0, ScaleFamily::K1);

        let w_out: f64 = out.iter().map(|x| x.weight()).sum();
        assert!(approx(w_in, w_out, 1e-12), "weight preserved");
        assert!(is_sorted_by_mean(&out), "means non-decreasing");
        assert!(out.len() < 1000, "clusters formed");
        assert!(
            out.len() <= 2 * 50,
            "centroid count roughly bounded by compression, got {}",
            out.len()
        );
    }

    #[test]
    fn tails_get_smaller_centroids_than_the_middle() {
        let items: Vec<_> = (0..10_000).map(|i| c(i as f64, 1.0)).collect();
        let out = klimit_merge(items, 10_000.0, 100.0, ScaleFamily::K1);
        let first = out.first().expect("non-empty").weight();
        let last = out.last().expect("non-empty").weight();
        let middle = out[out.len() / 2].weight();
        assert!(first < middle && last < middle, "{first} {middle} {last}");
    }

    #[test]
    fn large_compression_keeps_points_separate() {
        let items: Vec<_> = (1..100).map(|i| c(i as f64, 1.0)).collect();
        let out = klimit_merge(items, 99.0, 500.0, ScaleFamily::K1);
        assert_eq!(out.len(), 99);
    }

    #[test]
    fn single_point_passes_through() {
        let out = klimit_merge(vec![c(4.0, 2.5)], 2.5, 100.0, ScaleFamily::K1);
        assert_eq!(out, vec![c(4.0, 2.5)]);
    }

    #[test]
    fn empty_stream_yields_nothing() {
        let out = compress_into(Vec::new(), 0.0, 100.0, ScaleFamily::K1);
        assert!(out.is_empty());
    }

    #[test]
    #[should_panic(expected = "compress_into requires non-decreasing means")]
    fn compress_into_panics_on_unsorted_means() {
        let input = vec![c(1.0, 1.0), c(0.9, 1.0)];
        let _ = compress_into(input, 2.0, 10.0, ScaleFamily::K1);
    }

    #[test]
    fn every_family_conserves_weight() {
        for fam in [
            ScaleFamily::K1,
            ScaleFamily::K2,
            ScaleFamily::K3,
            ScaleFamily::Quad,
        ] {
            let items: Vec<_> = (0..500).map(|i| c((i as f64).sqrt(), 0.5)).collect();
            let out = compress_into(items, 250.0, 32.0, fam);
            let w: f64 = out.iter().map(|x| x.weight()).sum();
            assert!(approx(w, 250.0, 1e-12), "{fam:?}");
            assert!(is_sorted_by_mean(&out));
        }
    }
}
