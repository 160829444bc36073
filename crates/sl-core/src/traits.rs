//! Core traits for SwarmLimits
//!
//! High-level inference logic (Bayes, Wald, asymptotic CLs, expected limits)
//! depends only on these traits, never on concrete swarm models.

use crate::Result;
use rand::RngCore;

/// A binned counting model with a single parameter of interest.
///
/// Implementations are immutable during inference: `generate` draws from an
/// external RNG so that one model can be shared by several calculators and by
/// parallel ensemble workers.
pub trait ProbabilityModel: Send + Sync {
    /// Number of bins every dataset must have.
    fn n_bins(&self) -> usize;

    /// Generate one pseudo-experiment at the given value of the poi.
    fn generate(&self, poi: f64, rng: &mut dyn RngCore) -> Result<Vec<f64>>;

    /// Likelihood (probability of `data`) at the given value of the poi.
    fn likelihood(&self, data: &[f64], poi: f64) -> Result<f64>;

    /// Natural log of the likelihood.
    ///
    /// Models whose likelihood is a long product should override this to avoid
    /// underflow.
    fn ln_likelihood(&self, data: &[f64], poi: f64) -> Result<f64> {
        Ok(self.likelihood(data, poi)?.ln())
    }

    /// Negative log-likelihood.
    fn nll(&self, data: &[f64], poi: f64) -> Result<f64> {
        Ok(-self.ln_likelihood(data, poi)?)
    }
}

/// Prior density for the parameter of interest (need not be normalized).
pub trait PriorFunction: Send + Sync {
    /// Prior weight at `poi`.
    fn density(&self, poi: f64) -> f64;
}

impl<F> PriorFunction for F
where
    F: Fn(f64) -> f64 + Send + Sync,
{
    fn density(&self, poi: f64) -> f64 {
        self(poi)
    }
}

/// Common interface of the limit calculators, consumed by the expected-limits driver.
pub trait LimitCalculator: Send {
    /// Model the calculator was built on.
    fn pdf(&self) -> &dyn ProbabilityModel;

    /// Replace the dataset. Invalidates every cached fit or posterior.
    fn set_data(&mut self, data: &[f64]) -> Result<()>;

    /// Limit at confidence/credibility level `cl` (`None` uses the stored level).
    ///
    /// A limit that could not be computed (failed bracket, non-convergence) is
    /// reported as `-1.0` rather than an error.
    fn percentile(&mut self, cl: Option<f64>) -> Result<f64>;

    /// Significance of the hypothesis `poi = mu` relative to `poi = 0`.
    fn zvalue(&mut self, mu: f64) -> Result<f64>;

    /// Point estimate of the poi for the current dataset.
    fn estimate(&mut self) -> Result<f64>;

    /// Uncertainty associated with [`LimitCalculator::estimate`].
    fn uncertainty(&mut self) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingModel;

    impl ProbabilityModel for CountingModel {
        fn n_bins(&self) -> usize {
            1
        }

        fn generate(&self, _poi: f64, _rng: &mut dyn RngCore) -> Result<Vec<f64>> {
            Ok(vec![0.0])
        }

        fn likelihood(&self, data: &[f64], poi: f64) -> Result<f64> {
            // Poisson(0 | poi) = exp(-poi)
            assert_eq!(data, &[0.0]);
            Ok((-poi).exp())
        }
    }

    #[test]
    fn test_default_nll_is_negative_log() {
        let m = CountingModel;
        let nll = m.nll(&[0.0], 2.5).unwrap();
        assert!((nll - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_closure_prior() {
        let prior = |poi: f64| 1.0 / (1.0 + poi);
        assert!((prior.density(1.0) - 0.5).abs() < 1e-15);
    }
}
