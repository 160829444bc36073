//! Asymptotic CLs hypothesis tests (frequentist).
//!
//! The test statistic is `q(poi) = -2 ln(L(poi) / L(poi_hat))`, clipped at 0.
//! The Gaussian width of the poi estimator comes from the curvature of the
//! NLL at the best fit, which gives
//! `CLs+b = 1 - Φ(√q)` and `CLb = Φ(poi/σ - √q)`.

use crate::mle::{FitConfig, MaximumLikelihoodEstimator, validate_data, validate_range};
use crate::optimizer::second_derivative_forward;
use crate::roots::find_root;
use serde::{Deserialize, Serialize};
use sl_core::{FitResult, LimitCalculator, ProbabilityModel, Result};
use sl_prob::normal;

/// Step of the forward difference used for the curvature at `poi_hat`.
const CURVATURE_STEP: f64 = 1e-3;

/// Result of one asymptotic CLs evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypotestResult {
    /// Tested poi value
    pub poi: f64,
    /// `CLs+b / CLb`, or `-1` when `CLb <= 0`
    pub cls: f64,
    /// Observed CLs+b value
    pub clsb: f64,
    /// Observed CLb value
    pub clb: f64,
    /// Observed test statistic
    pub q_obs: f64,
    /// Gaussian width of the poi estimator
    pub sigma: f64,
}

/// Asymptotic CLs calculator bound to one model and one dataset.
///
/// The unconditional fit and the log-likelihood at its minimum are computed at
/// construction and again on every [`LimitCalculator::set_data`].
#[derive(Clone)]
pub struct AsymptoticCls<'a> {
    model: &'a dyn ProbabilityModel,
    data: Vec<f64>,
    poi_min: f64,
    poi_max: f64,
    config: FitConfig,
    fit: FitResult,
    ln_denominator: f64,
    sigma: f64,
    last: Option<HypotestResult>,
}

struct Denominator {
    fit: FitResult,
    ln_denominator: f64,
    sigma: f64,
}

fn fit_denominator(
    model: &dyn ProbabilityModel,
    data: &[f64],
    poi_min: f64,
    poi_max: f64,
    config: &FitConfig,
) -> Result<Denominator> {
    let fit = MaximumLikelihoodEstimator::with_config(config.clone())
        .fit(model, data, poi_min, poi_max, None)?;
    let ln_denominator = model.ln_likelihood(data, fit.poi_hat)?;

    let nll = |poi: f64| model.nll(data, poi);
    let d2 = second_derivative_forward(&nll, fit.poi_hat, CURVATURE_STEP)?;
    let sigma = 1.0 / d2.abs().sqrt();
    if !sigma.is_finite() {
        log::warn!("AsymptoticCls: curvature {} at poi_hat = {} gives sigma = {}", d2, fit.poi_hat, sigma);
    }

    Ok(Denominator { fit, ln_denominator, sigma })
}

impl<'a> AsymptoticCls<'a> {
    /// Create a calculator and fit `data` immediately.
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
        let Denominator { fit, ln_denominator, sigma } =
            fit_denominator(model, data, poi_min, poi_max, &config)?;
        Ok(Self {
            model,
            data: data.to_vec(),
            poi_min,
            poi_max,
            config,
            fit,
            ln_denominator,
            sigma,
            last: None,
        })
    }

    /// Unconditional fit of the current dataset
    pub fn fit(&self) -> &FitResult {
        &self.fit
    }

    /// Gaussian width of the poi estimator
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Current dataset
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Configuration
    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// `max(0, -2 ln(L(poi) / L(poi_hat)))`; NaN anywhere gives 0.
    pub fn q_statistic(&self, poi: f64) -> Result<f64> {
        let ln_numerator = self.model.ln_likelihood(&self.data, poi)?;
        if ln_numerator.is_nan() || self.ln_denominator.is_nan() {
            log::warn!(
                "AsymptoticCls: NaN likelihood at poi = {} (ln L = {}, ln D = {})",
                poi,
                ln_numerator,
                self.ln_denominator
            );
            return Ok(0.0);
        }
        let ln_ratio = ln_numerator - self.ln_denominator;
        if ln_ratio.is_nan() {
            log::warn!("AsymptoticCls: NaN likelihood ratio at poi = {}", poi);
            return Ok(0.0);
        }
        Ok((-2.0 * ln_ratio).max(0.0))
    }

    fn evaluate(&self, poi: f64) -> Result<HypotestResult> {
        let q_obs = self.q_statistic(poi)?;
        let sqrt_q = q_obs.sqrt();
        let clsb = normal::sf(sqrt_q);
        let clb = normal::cdf(poi / self.sigma - sqrt_q);
        let cls = if clb > 0.0 {
            clsb / clb
        } else {
            log::warn!("AsymptoticCls: CLb = {} at poi = {}", clb, poi);
            -1.0
        };
        Ok(HypotestResult { poi, cls, clsb, clb, q_obs, sigma: self.sigma })
    }

    /// Evaluate CLs at `poi` and remember the result.
    pub fn hypotest(&mut self, poi: f64) -> Result<&HypotestResult> {
        let result = self.evaluate(poi)?;
        Ok(self.last.insert(result))
    }

    /// Most recent [`AsymptoticCls::hypotest`] result
    pub fn last(&self) -> Option<&HypotestResult> {
        self.last.as_ref()
    }

    /// CLs+b of the most recent evaluation
    pub fn clsb(&self) -> Option<f64> {
        self.last.as_ref().map(|r| r.clsb)
    }

    /// CLb of the most recent evaluation
    pub fn clb(&self) -> Option<f64> {
        self.last.as_ref().map(|r| r.clb)
    }

    /// Test statistic of the most recent evaluation
    pub fn q_obs(&self) -> Option<f64> {
        self.last.as_ref().map(|r| r.q_obs)
    }

    /// Upper limit where `CLs = 1 - cl`, or `-1` when no root is found.
    pub fn limit(&mut self, cl: f64) -> Result<f64> {
        let alpha = 1.0 - cl;
        let f = |poi: f64| -> Result<f64> { Ok(self.evaluate(poi)?.cls - alpha) };
        let root = find_root(&f, self.poi_min, self.poi_max, &self.config.root)?;
        if !root.converged() {
            log::warn!(
                "AsymptoticCls: limit search on [{}, {}] failed: {}",
                self.poi_min,
                self.poi_max,
                root.status
            );
            return Ok(-1.0);
        }
        Ok(root.x)
    }
}

impl LimitCalculator for AsymptoticCls<'_> {
    fn pdf(&self) -> &dyn ProbabilityModel {
        self.model
    }

    fn set_data(&mut self, data: &[f64]) -> Result<()> {
        validate_data(self.model, data)?;
        let Denominator { fit, ln_denominator, sigma } =
            fit_denominator(self.model, data, self.poi_min, self.poi_max, &self.config)?;
        self.data.clear();
        self.data.extend_from_slice(data);
        self.fit = fit;
        self.ln_denominator = ln_denominator;
        self.sigma = sigma;
        self.last = None;
        Ok(())
    }

    fn percentile(&mut self, cl: Option<f64>) -> Result<f64> {
        if let Some(cl) = cl {
            self.config.cl = cl;
            self.config.validate()?;
        }
        self.limit(self.config.cl)
    }

    fn zvalue(&mut self, mu: f64) -> Result<f64> {
        Ok(self.q_statistic(mu)?.sqrt())
    }

    fn estimate(&mut self) -> Result<f64> {
        Ok(self.fit.poi_hat)
    }

    fn uncertainty(&mut self) -> Result<f64> {
        Ok(self.fit.poi_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::RngCore;

    struct Counting {
        b: f64,
    }

    impl ProbabilityModel for Counting {
        fn n_bins(&self) -> usize {
            1
        }
        fn generate(&self, _poi: f64, _rng: &mut dyn RngCore) -> Result<Vec<f64>> {
            Ok(vec![self.b])
        }
        fn likelihood(&self, data: &[f64], poi: f64) -> Result<f64> {
            Ok(sl_prob::poisson::pmf(data[0], poi + self.b))
        }
        fn ln_likelihood(&self, data: &[f64], poi: f64) -> Result<f64> {
            Ok(sl_prob::poisson::logpmf(data[0], poi + self.b))
        }
    }

    #[test]
    fn test_cls_is_one_at_zero_signal() {
        let model = Counting { b: 3.0 };
        let mut cls = AsymptoticCls::new(&model, &[3.0], 0.0, 30.0, FitConfig::default()).unwrap();
        // nll'' = n / (poi + b)^2 = 1/3 at poi_hat = 0
        assert_relative_eq!(cls.sigma(), 3f64.sqrt(), max_relative = 1e-2);
        let r = cls.hypotest(0.0).unwrap().clone();
        assert_relative_eq!(r.q_obs, 0.0, epsilon = 1e-8);
        assert_relative_eq!(r.cls, 1.0, epsilon = 1e-6);
        assert_eq!(cls.clsb(), Some(r.clsb));
        assert_eq!(cls.q_obs(), Some(r.q_obs));
    }

    #[test]
    fn test_limit_hits_alpha() {
        let model = Counting { b: 3.0 };
        let mut cls = AsymptoticCls::new(&model, &[5.0], 0.0, 40.0, FitConfig::default()).unwrap();
        let limit = cls.percentile(Some(0.95)).unwrap();
        assert!(limit > cls.fit().poi_hat);
        let r = cls.hypotest(limit).unwrap();
        assert!((r.cls - 0.05).abs() < 1e-3, "cls = {}", r.cls);
        // CLs is never smaller than CLs+b
        assert!(r.cls >= r.clsb);
    }

    #[test]
    fn test_set_data_refits() {
        let model = Counting { b: 2.0 };
        let mut cls = AsymptoticCls::new(&model, &[2.0], 0.0, 40.0, FitConfig::default()).unwrap();
        let before = cls.percentile(None).unwrap();
        cls.hypotest(1.0).unwrap();
        cls.set_data(&[8.0]).unwrap();
        assert!(cls.last().is_none());
        assert_relative_eq!(cls.estimate().unwrap(), 6.0, epsilon = 1e-5);
        let after = cls.percentile(None).unwrap();
        assert!(after > before);
        assert!(cls.zvalue(0.0).unwrap() > 2.0);
    }

    #[test]
    fn test_result_serializes() {
        let model = Counting { b: 1.0 };
        let mut cls = AsymptoticCls::new(&model, &[1.0], 0.0, 20.0, FitConfig::default()).unwrap();
        let r = cls.hypotest(2.0).unwrap().clone();
        let json = serde_json::to_string(&r).unwrap();
        let back: HypotestResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.poi, 2.0);
        assert_relative_eq!(back.cls, r.cls, max_relative = 1e-12);
        assert_relative_eq!(back.q_obs, r.q_obs, max_relative = 1e-12);
    }
}
