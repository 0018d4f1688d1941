//! tdigest-testdata
//! Seeded synthetic `(value, weight)` streams shared by tests and benches,
//! plus exact weighted reference statistics to score estimates against.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal};

/// Shape of the value stream.
#[derive(Clone, Copy, Debug)]
pub enum ValueShape {
    /// Uniform in \[lo, hi)
    Uniform { lo: f64, hi: f64 },
    /// Gaussian, unbounded
    Normal { mean: f64, sd: f64 },
    /// exp(N(0, σ²)); long right tail
    LogNormal { sigma: f64 },
    /// Tight clumps at 10, 50 and 90 over a broad uniform floor
    Clustered,
}

/// Shape of the weight stream. Weights are always strictly positive.
#[derive(Clone, Copy, Debug)]
pub enum WeightShape {
    /// Every sample weighs 1
    Unit,
    /// Uniform in \[lo, hi); `lo` must be > 0
    Uniform { lo: f64, hi: f64 },
    /// Integer counts in \[1, max]
    Counts { max: u32 },
}

fn draw_value(shape: ValueShape, rng: &mut StdRng) -> f64 {
    match shape {
        ValueShape::Uniform { lo, hi } => rng.random_range(lo..hi),
        ValueShape::Normal { mean, sd } => match Normal::new(mean, sd) {
            Ok(d) => d.sample(rng),
            Err(_) => mean,
        },
        ValueShape::LogNormal { sigma } => match LogNormal::new(0.0, sigma) {
            Ok(d) => d.sample(rng),
            Err(_) => 1.0,
        },
        ValueShape::Clustered => {
            let bucket: u32 = rng.random_range(0..100);
            match bucket {
                0..=59 => {
                    let center = match rng.random_range(0..3) {
                        0 => 10.0,
                        1 => 50.0,
                        _ => 90.0,
                    };
                    center + rng.random_range(-1.0..1.0) * 1e-2
                }
                _ => rng.random_range(0.0..100.0),
            }
        }
    }
}

fn draw_weight(shape: WeightShape, rng: &mut StdRng) -> f64 {
    match shape {
        WeightShape::Unit => 1.0,
        WeightShape::Uniform { lo, hi } => rng.random_range(lo..hi),
        WeightShape::Counts { max } => rng.random_range(1..=max.max(1)) as f64,
    }
}

/// `n` weighted samples, reproducible for a given `seed`.
pub fn gen_weighted(
    values: ValueShape,
    weights: WeightShape,
    n: usize,
    seed: u64,
) -> Vec<(f64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let v = draw_value(values, &mut rng);
            let w = draw_weight(weights, &mut rng);
            (v, w)
        })
        .collect()
}

/// Unit-weight values only.
pub fn gen_values(values: ValueShape, n: usize, seed: u64) -> Vec<f64> {
    gen_weighted(values, WeightShape::Unit, n, seed)
        .into_iter()
        .map(|(v, _)| v)
        .collect()
}

/// Exact weighted rank of `x`: fraction of weight strictly below plus half the weight at `x`.
pub fn exact_cdf(samples: &[(f64, f64)], x: f64) -> f64 {
    let total: f64 = samples.iter().map(|&(_, w)| w).sum();
    let mut below = 0.0;
    let mut equal = 0.0;
    for &(v, w) in samples {
        if v < x {
            below += w;
        } else if v == x {
            equal += w;
        }
    }
    (below + 0.5 * equal) / total
}

/// Smallest sample value whose cumulative weight reaches `q · total`.
pub fn exact_quantile(samples: &[(f64, f64)], q: f64) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: f64 = sorted.iter().map(|&(_, w)| w).sum();
    let target = q.clamp(0.0, 1.0) * total;
    let mut cum = 0.0;
    for &(v, w) in &sorted {
        cum += w;
        if cum >= target {
            return v;
        }
    }
    sorted.last().map(|&(v, _)| v).unwrap_or(f64::NAN)
}
