//! Limits in the Wald (asymptotic Gaussian) approximation.
//!
//! The profile-likelihood ratio `q(poi) = 2 (nll(poi) - nll(poi_hat))` is
//! treated as a chi-square with one degree of freedom, so an upper limit is
//! where the one-sided p-value `1 - Φ(√q)` drops to `1 - cl`.

use crate::mle::{FitConfig, MaximumLikelihoodEstimator, validate_data, validate_range};
use crate::roots::find_root;
use sl_core::{Error, FitResult, LimitCalculator, ProbabilityModel, Result};

/// The one-sided p-value never exceeds 1/2, so only `cl > 0.5` has a limit.
fn validate_upper_cl(cl: f64) -> Result<()> {
    if !(cl > 0.5 && cl < 1.0) {
        return Err(Error::Validation(format!(
            "Wald upper limits need cl in (0.5, 1), got {}",
            cl
        )));
    }
    Ok(())
}

/// Wald calculator bound to one model and one dataset
#[derive(Clone)]
pub struct Wald<'a> {
    model: &'a dyn ProbabilityModel,
    data: Vec<f64>,
    poi_min: f64,
    poi_max: f64,
    config: FitConfig,
    fit: Option<FitResult>,
}

impl<'a> Wald<'a> {
    /// Create a calculator for `data` with the poi restricted to `[poi_min, poi_max]`.
    pub fn new(
        model: &'a dyn ProbabilityModel,
        data: &[f64],
        poi_min: f64,
        poi_max: f64,
        config: FitConfig,
    ) -> Result<Self> {
        validate_range(poi_min, poi_max)?;
        validate_data(model, data)?;
        config.validate()?;
        validate_upper_cl(config.cl)?;
        Ok(Self { model, data: data.to_vec(), poi_min, poi_max, config, fit: None })
    }

    /// Current dataset
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Allowed poi range
    pub fn range(&self) -> (f64, f64) {
        (self.poi_min, self.poi_max)
    }

    /// Change the poi range; the cached fit is dropped.
    pub fn set_range(&mut self, poi_min: f64, poi_max: f64) -> Result<()> {
        validate_range(poi_min, poi_max)?;
        self.poi_min = poi_min;
        self.poi_max = poi_max;
        self.fit = None;
        Ok(())
    }

    /// Configuration
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Negative log-likelihood of the current dataset
    pub fn nll(&self, poi: f64) -> Result<f64> {
        self.model.nll(&self.data, poi)
    }

    fn compute_fit(&self, guess: Option<f64>) -> Result<FitResult> {
        MaximumLikelihoodEstimator::with_config(self.config.clone()).fit(
            self.model,
            &self.data,
            self.poi_min,
            self.poi_max,
            guess,
        )
    }

    /// Fit the poi and cache the result.
    pub fn fit(&mut self, guess: Option<f64>) -> Result<&FitResult> {
        let result = self.compute_fit(guess)?;
        Ok(self.fit.insert(result))
    }

    /// Cached fit, computed on first use
    pub fn fit_result(&mut self) -> Result<&FitResult> {
        let fit = match self.fit.take() {
            Some(fit) => fit,
            None => self.compute_fit(None)?,
        };
        Ok(self.fit.insert(fit))
    }

    fn best_fit(&mut self) -> Result<(f64, f64)> {
        let fit = self.fit_result()?;
        Ok((fit.poi_hat, fit.nll))
    }

    fn q_given(&self, nll_hat: f64, poi: f64) -> Result<f64> {
        let q = 2.0 * (self.nll(poi)? - nll_hat);
        if q.is_nan() {
            log::warn!("Wald: q is NaN at poi = {}; using 0", poi);
            return Ok(0.0);
        }
        Ok(q)
    }

    fn p_value_given(&self, poi_hat: f64, nll_hat: f64, poi: f64) -> Result<f64> {
        let q = if poi < poi_hat { 0.0 } else { self.q_given(nll_hat, poi)? };
        Ok(sl_prob::normal::sf(q.signum() * q.abs().sqrt()))
    }

    /// Two-sided profile-likelihood statistic `2 (nll(poi) - nll(poi_hat))`.
    pub fn q_statistic(&mut self, poi: f64) -> Result<f64> {
        let (_, nll_hat) = self.best_fit()?;
        self.q_given(nll_hat, poi)
    }

    /// One-sided statistic: zero below `poi_hat`.
    pub fn q_one_sided(&mut self, poi: f64) -> Result<f64> {
        let (poi_hat, nll_hat) = self.best_fit()?;
        if poi < poi_hat {
            return Ok(0.0);
        }
        self.q_given(nll_hat, poi)
    }

    /// One-sided p-value `1 - Φ(sign(q) √|q|)`.
    pub fn p_value(&mut self, poi: f64) -> Result<f64> {
        let (poi_hat, nll_hat) = self.best_fit()?;
        self.p_value_given(poi_hat, nll_hat, poi)
    }

    /// Upper limit at confidence level `cl`, or `-1` when no root is found.
    pub fn limit(&mut self, cl: f64) -> Result<f64> {
        validate_upper_cl(cl)?;
        let (poi_hat, nll_hat) = self.best_fit()?;
        let alpha = 1.0 - cl;
        let (lo, hi) = if self.p_value_given(poi_hat, nll_hat, poi_hat)? > alpha {
            (poi_hat, self.poi_max)
        } else {
            (self.poi_min, poi_hat)
        };
        if hi <= lo {
            log::warn!("Wald: empty bracket [{}, {}] for cl = {}", lo, hi, cl);
            return Ok(-1.0);
        }

        let f = |poi: f64| -> Result<f64> { Ok(self.p_value_given(poi_hat, nll_hat, poi)? - alpha) };
        let root = find_root(&f, lo, hi, &self.config.root)?;
        if !root.converged() {
            log::warn!("Wald: limit search on [{}, {}] failed: {}", lo, hi, root.status);
            return Ok(-1.0);
        }
        Ok(root.x)
    }
}

impl LimitCalculator for Wald<'_> {
    fn pdf(&self) -> &dyn ProbabilityModel {
        self.model
    }

    fn set_data(&mut self, data: &[f64]) -> Result<()> {
        validate_data(self.model, data)?;
        self.data.clear();
        self.data.extend_from_slice(data);
        self.fit = None;
        Ok(())
    }

    fn percentile(&mut self, cl: Option<f64>) -> Result<f64> {
        if let Some(cl) = cl {
            validate_upper_cl(cl)?;
            self.config.cl = cl;
        }
        self.limit(self.config.cl)
    }

    fn zvalue(&mut self, mu: f64) -> Result<f64> {
        let q = self.q_statistic(mu)?;
        if q < 0.0 {
            log::warn!("Wald: negative q = {} at poi = {}", q, mu);
            return Ok(-(-q).sqrt());
        }
        Ok(q.sqrt())
    }

    fn estimate(&mut self) -> Result<f64> {
        Ok(self.fit_result()?.poi_hat)
    }

    fn uncertainty(&mut self) -> Result<f64> {
        Ok(self.fit_result()?.poi_err)
    }
}
