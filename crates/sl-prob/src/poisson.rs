//! Poisson distribution utilities.
//!
//! Counts are carried as `f64` throughout the workspace; `n` is expected to be a
//! non-negative integer value.

use statrs::function::gamma::ln_gamma;

/// Log-PMF of `Poisson(mean)` at `n`.
///
/// `mean == 0` gives `0` at `n == 0` and `-inf` elsewhere.
pub fn logpmf(n: f64, mean: f64) -> f64 {
    if n < 0.0 || mean < 0.0 || !mean.is_finite() {
        return f64::NEG_INFINITY;
    }
    if mean == 0.0 {
        return if n == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    n * mean.ln() - mean - ln_gamma(n + 1.0)
}

/// PMF of `Poisson(mean)` at `n`.
#[inline]
pub fn pmf(n: f64, mean: f64) -> f64 {
    logpmf(n, mean).exp()
}

/// Product of per-bin Poisson probabilities, in log space.
pub fn ln_product(data: &[f64], means: &[f64]) -> f64 {
    data.iter().zip(means).map(|(&n, &m)| logpmf(n, m)).sum()
}
