//! Maximum Likelihood Estimation of the parameter of interest

use crate::optimizer::{MinimizerConfig, minimize_bounded, second_derivative};
use crate::roots::RootConfig;
use sl_core::{Error, FitResult, ProbabilityModel, Result};

/// Configuration shared by the profile-likelihood calculators
#[derive(Debug, Clone, PartialEq)]
pub struct FitConfig {
    /// Confidence level used when `percentile(None)` is requested
    pub cl: f64,
    /// Minimizer settings for the MLE fit
    pub minimizer: MinimizerConfig,
    /// Root-finder settings for limits
    pub root: RootConfig,
    /// Finite-difference step for the curvature, as a fraction of the poi range
    pub curvature_step: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            cl: 0.95,
            minimizer: MinimizerConfig::default(),
            root: RootConfig::default(),
            curvature_step: 1e-4,
        }
    }
}

impl FitConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.cl > 0.0 && self.cl < 1.0) {
            return Err(Error::Validation(format!("cl must be in (0, 1), got {}", self.cl)));
        }
        if !(self.curvature_step > 0.0 && self.curvature_step < 1.0) {
            return Err(Error::Validation(format!(
                "curvature_step must be in (0, 1), got {}",
                self.curvature_step
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_range(poi_min: f64, poi_max: f64) -> Result<()> {
    if !(poi_min.is_finite() && poi_max.is_finite() && poi_min < poi_max) {
        return Err(Error::Validation(format!(
            "poi range must be finite with poi_min < poi_max, got [{}, {}]",
            poi_min, poi_max
        )));
    }
    Ok(())
}

pub(crate) fn validate_data(model: &dyn ProbabilityModel, data: &[f64]) -> Result<()> {
    if data.len() != model.n_bins() {
        return Err(Error::BinMismatch {
            context: "dataset",
            expected: model.n_bins(),
            got: data.len(),
        });
    }
    Ok(())
}

/// One-parameter maximum likelihood estimator
#[derive(Debug, Clone, Default)]
pub struct MaximumLikelihoodEstimator {
    config: FitConfig,
}

impl MaximumLikelihoodEstimator {
    /// Create a new MLE with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom configuration
    pub fn with_config(config: FitConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Fit the poi over `[poi_min, poi_max]`.
    ///
    /// `guess`, when inside the range, is kept if it beats the minimizer's
    /// answer. A non-converged fit is logged and reported with `poi_hat = poi_min`.
    pub fn fit(
        &self,
        model: &dyn ProbabilityModel,
        data: &[f64],
        poi_min: f64,
        poi_max: f64,
        guess: Option<f64>,
    ) -> Result<FitResult> {
        validate_range(poi_min, poi_max)?;
        validate_data(model, data)?;
        let nll = |poi: f64| model.nll(data, poi);

        let opt = minimize_bounded(&nll, poi_min, poi_max, &self.config.minimizer)?;
        let mut poi_hat = opt.x;
        let mut fval = nll(poi_hat)?;

        if let Some(g) = guess.filter(|g| (poi_min..=poi_max).contains(g)) {
            let fg = nll(g)?;
            if fg < fval {
                poi_hat = g;
                fval = fg;
            }
        }

        if !opt.converged {
            log::warn!(
                "MLE fit did not converge ({}); falling back to poi_min = {}",
                opt.message,
                poi_min
            );
            poi_hat = poi_min;
            fval = nll(poi_min)?;
        }

        let h = self.config.curvature_step * (poi_max - poi_min);
        let d2 = second_derivative(&nll, poi_hat, h, poi_min, poi_max)?;
        let poi_err = if d2.is_finite() && d2 > 0.0 {
            1.0 / d2.sqrt()
        } else {
            log::warn!("MLE fit: non-positive curvature {} at poi_hat = {}", d2, poi_hat);
            -1.0
        };

        Ok(FitResult::new(poi_hat, poi_err, fval, opt.converged, opt.n_fev)
            .with_message(opt.message))
    }
}
