use serde::{Deserialize, Serialize};

/// Scale families define the q→k mapping that controls centroid granularity.
///
/// The compressor only lets a cluster grow while its k-span stays within 1, so a
/// steep mapping near q=0 and q=1 keeps tail centroids small.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")] // accept "k1","k2","k3","quad"
pub enum ScaleFamily {
    /// k1: arcsine scale (DEFAULT).
    #[default]
    K1,
    /// k2: logistic scale.
    K2,
    /// k3: double-log scale.
    K3,
    /// Piecewise-quadratic tail-friendly scale.
    Quad,
}

impl ScaleFamily {
    /// Stable one-byte code used by the wire codec.
    #[inline]
    pub(crate) fn code(self) -> u8 {
        match self {
            ScaleFamily::K1 => 0,
            ScaleFamily::K2 => 1,
            ScaleFamily::K3 => 2,
            ScaleFamily::Quad => 3,
        }
    }

    #[inline]
    pub(crate) fn from_code(c: u8) -> Option<Self> {
        match c {
            0 => Some(ScaleFamily::K1),
            1 => Some(ScaleFamily::K2),
            2 => Some(ScaleFamily::K3),
            3 => Some(ScaleFamily::Quad),
            _ => None,
        }
    }
}

/// Family-aware `q → k` mapping. `d` is the compression parameter.
///
/// `q` is clamped away from {0, 1} so the logarithmic families stay finite; the
/// arcsine family maps into `[-d/4, d/4]`.
#[inline]
pub(crate) fn q_to_k(q: f64, d: f64, family: ScaleFamily) -> f64 {
    use std::f64::consts::{LN_2, PI};
    let eps = 1e-15;
    let qq = q.clamp(eps, 1.0 - eps);
    match family {
        ScaleFamily::K1 => {
            let s = (2.0 * qq - 1.0).clamp(-1.0, 1.0).asin();
            (d / (2.0 * PI)) * s
        }
        ScaleFamily::K2 => {
            let s = (qq / (1.0 - qq)).ln();
            (d / (4.0 * LN_2)) * s
        }
        ScaleFamily::K3 => {
            let a = (1.0 / (1.0 - qq)).ln(); // ln(1/(1-q))
            let b = (1.0 / qq).ln(); // ln(1/q)
            let ratio = (a / b).max(eps);
            (d / 4.0) * ratio.ln()
        }
        ScaleFamily::Quad => {
            // Inverse of: r=k/d; q = 2r^2 (r<0.5), else 1-2(1-r)^2
            let r = if qq < 0.5 {
                (qq * 0.5).sqrt()
            } else {
                1.0 - ((1.0 - qq) * 0.5).sqrt()
            };
            d * r
        }
    }
}
