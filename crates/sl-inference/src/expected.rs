//! Expected limits from pseudo-experiments.
//!
//! Each replica draws a dataset from the calculator's own model at the true
//! poi, recomputes the limit and optionally the point estimate. Randomness is
//! deterministic via per-replica seeding (`seed + index`), independent of
//! threading, so [`ExpectedLimits::run`] and [`ExpectedLimits::run_parallel`]
//! produce the same ensemble.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sl_core::{Error, LimitCalculator, Result};

/// Probabilities of the -2σ, -1σ, median, +1σ and +2σ expected limits.
pub const DEFAULT_PROBABILITIES: [f64; 5] = [0.0230, 0.1579, 0.5000, 0.8415, 0.9770];

/// Configuration for [`ExpectedLimits`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Maximum number of replicas per run
    pub size: usize,
    /// Base seed; replica `i` uses `seed + i`
    pub seed: u64,
    /// Probabilities at which the limit distribution is summarized
    pub probabilities: Vec<f64>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self { size: 400, seed: 42, probabilities: DEFAULT_PROBABILITIES.to_vec() }
    }
}

impl EnsembleConfig {
    fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::Validation("ensemble size must be >= 1".to_string()));
        }
        if let Some(p) = self.probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(Error::Validation(format!("probability must be in [0, 1], got {}", p)));
        }
        Ok(())
    }
}

/// Summary of one ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// poi value the replicas were generated at
    pub true_value: f64,
    /// Per-replica limits, sorted ascending
    pub limits: Vec<f64>,
    /// Probabilities of [`EnsembleResult::quantiles`]
    pub probabilities: Vec<f64>,
    /// Linearly interpolated empirical quantiles of `limits`
    pub quantiles: Vec<f64>,
    /// Mean of `estimate - true_value`
    pub bias: Option<f64>,
    /// `sqrt(mean((true_value - estimate)^2))`
    pub rms: Option<f64>,
    /// Replicas whose limit is the `-1` sentinel
    pub n_failed: usize,
}

impl EnsembleResult {
    /// Median expected limit
    pub fn median(&self) -> f64 {
        quantile_sorted(&self.limits, 0.5)
    }
}

fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if p <= 0.0 {
        return sorted[0];
    }
    if p >= 1.0 {
        return sorted[n - 1];
    }
    let idx = p * ((n - 1) as f64);
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let w = idx - (lo as f64);
    sorted[lo] + w * (sorted[hi] - sorted[lo])
}

#[derive(Debug, Clone, Copy)]
struct Replica {
    limit: f64,
    estimate: Option<f64>,
}

fn run_replica<C: LimitCalculator>(
    calculator: &mut C,
    true_value: f64,
    seed: u64,
    index: usize,
    compute_bias: bool,
) -> Result<Replica> {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
    let data = calculator.pdf().generate(true_value, &mut rng)?;
    if sl_core::verbosity() > 2 {
        log::debug!("replica {}: data = {:?}", index, data);
    }
    calculator.set_data(&data)?;
    let limit = calculator.percentile(None)?;
    let estimate = if compute_bias { Some(calculator.estimate()?) } else { None };
    Ok(Replica { limit, estimate })
}

/// Ensemble driver borrowing a calculator
pub struct ExpectedLimits<'c, C: LimitCalculator> {
    calculator: &'c mut C,
    config: EnsembleConfig,
}

impl<'c, C: LimitCalculator> ExpectedLimits<'c, C> {
    /// Create a driver.
    pub fn new(calculator: &'c mut C, config: EnsembleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { calculator, config })
    }

    /// Configuration
    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    fn replicas(&self, size: Option<usize>) -> usize {
        let requested = size.unwrap_or(self.config.size);
        if requested > self.config.size {
            log::warn!(
                "requested {} replicas, capped at the ensemble size {}",
                requested,
                self.config.size
            );
        }
        requested.min(self.config.size)
    }

    /// Run the ensemble sequentially on the borrowed calculator.
    ///
    /// The calculator is left holding the last replica's dataset.
    pub fn run(
        &mut self,
        true_value: f64,
        size: Option<usize>,
        compute_bias: bool,
    ) -> Result<EnsembleResult> {
        let n = self.replicas(size);
        let quarter = (n / 4).max(1);
        let mut replicas = Vec::with_capacity(n);
        for i in 0..n {
            replicas.push(run_replica(
                &mut *self.calculator,
                true_value,
                self.config.seed,
                i,
                compute_bias,
            )?);
            if (i + 1) % quarter == 0 {
                log::info!("expected limits: {}/{} replicas", i + 1, n);
            }
        }
        self.summarize(true_value, replicas)
    }

    fn summarize(&self, true_value: f64, replicas: Vec<Replica>) -> Result<EnsembleResult> {
        if replicas.is_empty() {
            return Err(Error::Validation("ensemble has no replicas".to_string()));
        }
        let n = replicas.len() as f64;
        let mut limits: Vec<f64> = replicas.iter().map(|r| r.limit).collect();
        let n_failed = limits.iter().filter(|&&l| l < 0.0).count();
        if n_failed > 0 {
            log::warn!("expected limits: {} of {} replicas failed", n_failed, replicas.len());
        }
        limits.sort_by(f64::total_cmp);

        let quantiles =
            self.config.probabilities.iter().map(|&p| quantile_sorted(&limits, p)).collect();

        let estimates: Option<Vec<f64>> = replicas.iter().map(|r| r.estimate).collect();
        let (bias, rms) = match estimates {
            Some(estimates) => {
                let bias = estimates.iter().map(|e| e - true_value).sum::<f64>() / n;
                let mse = estimates.iter().map(|e| (true_value - e).powi(2)).sum::<f64>() / n;
                (Some(bias), Some(mse.sqrt()))
            }
            None => (None, None),
        };

        Ok(EnsembleResult {
            true_value,
            limits,
            probabilities: self.config.probabilities.clone(),
            quantiles,
            bias,
            rms,
            n_failed,
        })
    }
}

impl<C: LimitCalculator + Clone + Sync> ExpectedLimits<'_, C> {
    /// Run the ensemble on rayon workers, each owning a clone of the calculator.
    ///
    /// Gives the same result as [`ExpectedLimits::run`]; the borrowed
    /// calculator itself is not touched.
    pub fn run_parallel(
        &self,
        true_value: f64,
        size: Option<usize>,
        compute_bias: bool,
    ) -> Result<EnsembleResult> {
        let n = self.replicas(size);
        let seed = self.config.seed;
        let template: &C = &*self.calculator;

        let replicas = (0..n)
            .into_par_iter()
            .map_init(
                || template.clone(),
                |calculator, i| run_replica(calculator, true_value, seed, i, compute_bias),
            )
            .collect::<Result<Vec<_>>>()?;
        log::info!("expected limits: {} replicas done", n);
        self.summarize(true_value, replicas)
    }
}
