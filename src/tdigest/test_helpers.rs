//! Assertion helpers shared by unit tests, integration tests and benches.

use crate::tdigest::centroids::total_weight;
use crate::tdigest::TDigest;

pub fn assert_exact(label: &str, expected: f64, got: f64) {
    assert!(
        expected == got,
        "{label}: expected exactly {expected:.9}, got {got:.9}"
    );
}

pub fn assert_abs_close(label: &str, expected: f64, got: f64, atol: f64) {
    let err = (expected - got).abs();
    assert!(
        err <= atol,
        "{label}: expected ~= {expected:.9}, got {got:.9}, abs_err={err:.6e}, atol={atol:.6e}"
    );
}

pub fn assert_monotone_chain(label: &str, values: &[f64]) {
    if let Some(i) = values.windows(2).position(|w| w[1] < w[0]) {
        panic!(
            "{label}: non-monotone at i={}: {} < {}",
            i + 1,
            values[i + 1],
            values[i]
        );
    }
}

/// The digest holds `expected` weight and its centroids account for all merged weight.
pub fn assert_weight_conserved(label: &str, expected: f64, td: &TDigest) {
    let tol = 1e-9 * expected.abs().max(1.0);
    assert_abs_close(label, expected, td.total_weight(), tol);
    assert_abs_close(
        label,
        td.merged_weight(),
        total_weight(td.centroids()),
        tol,
    );
}

/// Order statistics of sorted `values` straddling quantile `q`, widened by `slack` ranks.
pub fn rank_window(values: &[f64], q: f64, slack: usize) -> (f64, f64) {
    assert!(!values.is_empty(), "rank_window() requires non-empty values");
    let last = values.len() - 1;
    let r = q.clamp(0.0, 1.0) * last as f64;
    let lo = (r.floor() as usize).saturating_sub(slack);
    let hi = (r.ceil() as usize + slack).min(last);
    (values[lo], values[hi])
}
