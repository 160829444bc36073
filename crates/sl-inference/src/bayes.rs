//! Bayesian limits from the one-dimensional posterior of the poi.
//!
//! The posterior `L(data | poi) · prior(poi)` is tabulated on an adaptively
//! chosen support: the configured range is sampled, trimmed to where the
//! posterior exceeds `threshold` times its mode, and sampled again. The
//! cumulative table then serves quantile queries, while `cdf` integrates the
//! posterior directly with adaptive Gauss-Legendre quadrature.

use crate::mle::{validate_data, validate_range};
use crate::optimizer::{MinimizerConfig, minimize_bounded, second_derivative};
use crate::posterior::PosteriorTable;
use crate::prior::Prior;
use crate::quadrature::{Integrator, QuadratureConfig, simpson_cumulative};
use crate::roots::{RootConfig, find_root};
use serde::{Deserialize, Serialize};
use sl_core::{Error, LimitCalculator, PriorFunction, ProbabilityModel, Result};
use std::sync::Arc;

/// Configuration for [`Bayes`]
#[derive(Debug, Clone, PartialEq)]
pub struct BayesConfig {
    /// Credibility level used when `percentile(None)` is requested
    pub cl: f64,
    /// Number of cumulative-table intervals; the grid has `2 * n_steps` intervals
    pub n_steps: usize,
    /// Posterior fraction of the mode below which the support is trimmed
    pub threshold: f64,
    /// Number of support-search passes
    pub passes: usize,
    /// Minimizer settings for the MAP estimate
    pub minimizer: MinimizerConfig,
    /// Root-finder settings for quantiles
    pub root: RootConfig,
    /// Quadrature settings for `cdf`
    pub quadrature: QuadratureConfig,
    /// Finite-difference step for the MAP curvature, as a fraction of the support
    pub curvature_step: f64,
}

impl Default for BayesConfig {
    fn default() -> Self {
        Self {
            cl: 0.95,
            n_steps: 50,
            threshold: 1e-5,
            passes: 2,
            minimizer: MinimizerConfig::default(),
            root: RootConfig::default(),
            quadrature: QuadratureConfig::default(),
            curvature_step: 1e-4,
        }
    }
}

fn validate_cl(cl: f64) -> Result<()> {
    if !(cl > 0.0 && cl < 1.0) {
        return Err(Error::Validation(format!("cl must be in (0, 1), got {}", cl)));
    }
    Ok(())
}

impl BayesConfig {
    fn validate(&self) -> Result<()> {
        validate_cl(self.cl)?;
        if self.n_steps == 0 {
            return Err(Error::Validation("n_steps must be >= 1".to_string()));
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(Error::Validation(format!(
                "threshold must be in (0, 1), got {}",
                self.threshold
            )));
        }
        if self.passes == 0 {
            return Err(Error::Validation("passes must be >= 1".to_string()));
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

/// Posterior mode with a Gaussian half-width
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapEstimate {
    /// Location of the posterior maximum
    pub poi: f64,
    /// `z / √(d² (-ln posterior))` with `z` the two-sided quantile for `cl`
    pub half_width: f64,
    /// Credibility level of `half_width`
    pub cl: f64,
    /// Whether the minimizer converged
    pub converged: bool,
}

#[derive(Debug, Clone)]
struct Normalization {
    lo: f64,
    hi: f64,
    ln_normalization: f64,
    table: PosteriorTable,
}

/// Index and value of the largest entry; errors when the posterior is NaN or vanishes.
fn grid_mode(ln_p: &[f64], lo: f64, hi: f64) -> Result<(usize, f64)> {
    if ln_p.iter().any(|v| v.is_nan()) {
        return Err(Error::Computation(format!("NaN posterior on [{}, {}]", lo, hi)));
    }
    let (j_mode, &ln_max) = ln_p
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| Error::Computation("empty posterior grid".to_string()))?;
    if !ln_max.is_finite() {
        return Err(Error::Computation(format!(
            "posterior maximum on [{}, {}] is {}",
            lo,
            hi,
            ln_max.exp()
        )));
    }
    Ok((j_mode, ln_max))
}

/// Bayesian calculator bound to one model, one prior and one dataset
#[derive(Clone)]
pub struct Bayes<'a> {
    model: &'a dyn ProbabilityModel,
    prior: Arc<dyn PriorFunction + 'a>,
    data: Vec<f64>,
    poi_min: f64,
    poi_max: f64,
    config: BayesConfig,
    integrator: Integrator,
    normalization: Option<Normalization>,
    map: Option<MapEstimate>,
}

impl<'a> Bayes<'a> {
    /// Create a calculator with a flat prior over `[poi_min, poi_max]`.
    pub fn new(
        model: &'a dyn ProbabilityModel,
        data: &[f64],
        poi_min: f64,
        poi_max: f64,
        config: BayesConfig,
    ) -> Result<Self> {
        validate_range(poi_min, poi_max)?;
        validate_data(model, data)?;
        config.validate()?;
        let integrator = Integrator::new(config.quadrature.clone())?;
        Ok(Self {
            model,
            prior: Arc::new(Prior::Flat),
            data: data.to_vec(),
            poi_min,
            poi_max,
            config,
            integrator,
            normalization: None,
            map: None,
        })
    }

    /// Replace the prior.
    pub fn with_prior(mut self, prior: impl PriorFunction + 'a) -> Self {
        self.prior = Arc::new(prior);
        self.invalidate();
        self
    }

    fn invalidate(&mut self) {
        self.normalization = None;
        self.map = None;
    }

    /// Current dataset
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Configuration
    pub fn config(&self) -> &BayesConfig {
        &self.config
    }

    /// Stored credibility level
    pub fn cl(&self) -> f64 {
        self.config.cl
    }

    /// Change the stored credibility level.
    pub fn set_cl(&mut self, cl: f64) -> Result<()> {
        validate_cl(cl)?;
        self.config.cl = cl;
        Ok(())
    }

    /// `ln(L(data | poi) · prior(poi))`
    fn ln_unnormalized(&self, poi: f64) -> Result<f64> {
        let weight = self.prior.density(poi);
        if !(weight >= 0.0) {
            return Err(Error::Computation(format!("prior density {} at poi = {}", weight, poi)));
        }
        Ok(self.model.ln_likelihood(&self.data, poi)? + weight.ln())
    }

    fn sample(&self, lo: f64, step: f64, n: usize) -> Result<Vec<f64>> {
        (0..=n).map(|j| self.ln_unnormalized(lo + j as f64 * step)).collect()
    }

    fn build_normalization(&self) -> Result<Normalization> {
        let n = 2 * self.config.n_steps;
        let ln_threshold = self.config.threshold.ln();
        let (mut lo, mut hi) = (self.poi_min, self.poi_max);
        let mut previous_step = 0.0;

        for pass in 0..self.config.passes {
            hi += previous_step;
            let step = (hi - lo) / n as f64;
            let ln_p = self.sample(lo, step, n)?;
            let (j_mode, ln_max) = grid_mode(&ln_p, lo, hi)?;
            let cut = ln_max + ln_threshold;

            let leading = ln_p[..j_mode].iter().take_while(|&&v| v < cut).count();
            let j_lo = leading.saturating_sub(1);
            let j_hi = ln_p[j_mode + 1..]
                .iter()
                .position(|&v| v < cut)
                .map_or(n, |k| j_mode + 1 + k);

            let (new_lo, new_hi) = (lo + j_lo as f64 * step, lo + j_hi as f64 * step);
            log::debug!(
                "Bayes: pass {} on [{}, {}] mode at {}, support [{}, {}]",
                pass,
                lo,
                hi,
                lo + j_mode as f64 * step,
                new_lo,
                new_hi
            );
            lo = new_lo;
            hi = new_hi;
            previous_step = step;
        }

        let step = (hi - lo) / n as f64;
        let ln_p = self.sample(lo, step, n)?;
        let (_, ln_max) = grid_mode(&ln_p, lo, hi)?;
        let scaled: Vec<f64> = ln_p.iter().map(|v| (v - ln_max).exp()).collect();
        let cumulative = simpson_cumulative(&scaled, step)?;
        let total = cumulative[cumulative.len() - 1];
        let table = PosteriorTable::from_cumulative(lo, 2.0 * step, cumulative)?;

        Ok(Normalization { lo, hi, ln_normalization: total.ln() + ln_max, table })
    }

    fn normalized(&mut self) -> Result<&Normalization> {
        let norm = match self.normalization.take() {
            Some(norm) => norm,
            None => self.build_normalization()?,
        };
        Ok(self.normalization.insert(norm))
    }

    /// Recompute the support and the cumulative table.
    pub fn normalize(&mut self) -> Result<()> {
        self.normalization = None;
        self.normalized()?;
        Ok(())
    }

    /// Support `[poi_min, poi_max]` found by the last normalization
    pub fn support(&mut self) -> Result<(f64, f64)> {
        let norm = self.normalized()?;
        Ok((norm.lo, norm.hi))
    }

    /// Cumulative posterior table
    pub fn table(&mut self) -> Result<&PosteriorTable> {
        Ok(&self.normalized()?.table)
    }

    /// Natural log of `∫ L · prior` over the support
    pub fn ln_normalization(&mut self) -> Result<f64> {
        Ok(self.normalized()?.ln_normalization)
    }

    /// `∫ L · prior` over the support (may underflow for large datasets)
    pub fn normalization(&mut self) -> Result<f64> {
        Ok(self.ln_normalization()?.exp())
    }

    /// Normalized posterior density
    pub fn posterior(&mut self, poi: f64) -> Result<f64> {
        let ln_norm = self.ln_normalization()?;
        Ok((self.ln_unnormalized(poi)? - ln_norm).exp())
    }

    /// Posterior probability below `poi`.
    pub fn cdf(&mut self, poi: f64) -> Result<f64> {
        let (lo, hi, ln_norm) = {
            let norm = self.normalized()?;
            (norm.lo, norm.hi, norm.ln_normalization)
        };
        if poi <= lo {
            return Ok(0.0);
        }
        if poi >= hi {
            return Ok(1.0);
        }
        let density = |x: f64| -> Result<f64> { Ok((self.ln_unnormalized(x)? - ln_norm).exp()) };
        let p = self.integrator.integrate(&density, lo, poi)?;
        Ok(p.clamp(0.0, 1.0))
    }

    /// Posterior quantile at probability `p`, or `-1` when the root search fails.
    pub fn quantile(&mut self, p: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::Validation(format!("probability must be in [0, 1], got {}", p)));
        }
        let root_config = self.config.root.clone();
        let norm = self.normalized()?;
        let table = &norm.table;
        let f = |x: f64| -> Result<f64> { Ok(table.interpolate(x) - p) };
        let root = find_root(&f, norm.lo, norm.hi, &root_config)?;
        if !root.converged() {
            log::warn!("Bayes: quantile {} on [{}, {}]: {}", p, norm.lo, norm.hi, root.status);
            return Ok(-1.0);
        }
        Ok(root.x)
    }

    /// Posterior mode and half-width at credibility `cl`, cached per dataset.
    pub fn map(&mut self, cl: f64) -> Result<MapEstimate> {
        validate_cl(cl)?;
        if let Some(map) = self.map.filter(|m| m.cl == cl) {
            return Ok(map);
        }
        let (lo, hi) = self.support()?;
        let objective = |x: f64| -> Result<f64> { Ok(-self.ln_unnormalized(x)?) };
        let opt = minimize_bounded(&objective, lo, hi, &self.config.minimizer)?;
        if !opt.converged {
            log::warn!("Bayes: MAP search did not converge: {}", opt.message);
        }

        let h = self.config.curvature_step * (hi - lo);
        let d2 = second_derivative(&objective, opt.x, h, lo, hi)?;
        let z = sl_prob::normal::two_sided_z(cl)?;
        let half_width = if d2.is_finite() && d2 > 0.0 {
            z / d2.sqrt()
        } else {
            log::warn!("Bayes: non-positive curvature {} at the posterior mode {}", d2, opt.x);
            -1.0
        };

        let map = MapEstimate { poi: opt.x, half_width, cl, converged: opt.converged };
        self.map = Some(map);
        Ok(map)
    }
}

impl LimitCalculator for Bayes<'_> {
    fn pdf(&self) -> &dyn ProbabilityModel {
        self.model
    }

    fn set_data(&mut self, data: &[f64]) -> Result<()> {
        validate_data(self.model, data)?;
        self.data.clear();
        self.data.extend_from_slice(data);
        self.invalidate();
        Ok(())
    }

    fn percentile(&mut self, cl: Option<f64>) -> Result<f64> {
        if let Some(cl) = cl {
            self.set_cl(cl)?;
        }
        self.quantile(self.config.cl)
    }

    /// `sign(ln B) √(2 |ln B|)` with `ln B = ln(L(mu) / L(0))`.
    fn zvalue(&mut self, mu: f64) -> Result<f64> {
        let ln_b = self.model.ln_likelihood(&self.data, mu)?
            - self.model.ln_likelihood(&self.data, 0.0)?;
        if !ln_b.is_finite() {
            return Err(Error::Computation(format!("ln Bayes factor at poi = {} is {}", mu, ln_b)));
        }
        if ln_b == 0.0 {
            return Ok(0.0);
        }
        Ok(ln_b.signum() * (2.0 * ln_b.abs()).sqrt())
    }

    fn estimate(&mut self) -> Result<f64> {
        let map = self.map(self.config.cl)?;
        Ok(if map.converged { map.poi } else { -1.0 })
    }

    fn uncertainty(&mut self) -> Result<f64> {
        let map = self.map(self.config.cl)?;
        Ok(if map.converged { map.half_width } else { -1.0 })
    }
}
