//! Poisson-Gamma counting model marginalized over its nuisance parameters.
//!
//! Per bin the observed count is Poisson with mean `poi * eps + mu`, where
//!
//! ```text
//! eps ~ Gamma(shape = x + 1/2, rate = a)    (effective luminosity / efficiency)
//! mu  ~ Gamma(shape = y + 1/2, rate = b)    (background)
//! ```
//!
//! Integrating out `eps` gives a negative binomial in the signal count `k`,
//! integrating out `mu` a negative binomial in the background count `n - k`,
//! and the bin probability is their convolution:
//!
//! ```text
//! p(n | poi) = sum_{k=0}^{n} C1[k] * C2[n - k]
//! C1[0] = (1 + p1)^-(A1 + 1),  C1[k] = C1[k-1] * p1/(1+p1) * (A1 + k)/k,  p1 = poi/a, A1 = x - 1/2
//! C2[0] = (1 + p2)^-(A2 + 1),  C2[k] = C2[k-1] * p2/(1+p2) * (A2 + k)/k,  p2 = 1/b,   A2 = y - 1/2
//! ```
//!
//! The recursion is carried in log space and the convolution is accumulated with
//! compensated summation relative to its largest term, so the result stays
//! accurate for counts in the tens of thousands.

use rand::RngCore;
use rand_distr::{Distribution, Gamma, Poisson};
use sl_core::{Error, ProbabilityModel, Result};
use sl_prob::math::NeumaierSum;

use crate::swarm::SwarmPoint;

/// Default ceiling on a single observed count.
pub const DEFAULT_MAX_COUNT: usize = 100_000;

/// Closed-form Poisson-Gamma likelihood for one swarm point.
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonGammaModel {
    /// Signal counts `x` (one per bin).
    signal_counts: Vec<f64>,
    /// Signal scale factors `a`.
    signal_scales: Vec<f64>,
    /// Background counts `y`.
    background_counts: Vec<f64>,
    /// Background scale factors `b`.
    background_scales: Vec<f64>,
    max_count: usize,
    data: Option<Vec<f64>>,
}

fn validate_counts(name: &str, counts: &[f64]) -> Result<()> {
    for (i, &c) in counts.iter().enumerate() {
        if !c.is_finite() || c <= -0.5 {
            return Err(Error::Validation(format!(
                "{} count in bin {} must be finite and > -0.5, got {}",
                name, i, c
            )));
        }
    }
    Ok(())
}

fn validate_scales(name: &str, scales: &[f64]) -> Result<()> {
    for (i, &s) in scales.iter().enumerate() {
        if !s.is_finite() || s <= 0.0 {
            return Err(Error::Validation(format!(
                "{} scale factor in bin {} must be finite and > 0, got {}",
                name, i, s
            )));
        }
    }
    Ok(())
}

fn check_len(context: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::BinMismatch { context, expected, got });
    }
    Ok(())
}

/// `ln C[0..=n]` for one gamma component with count `count` and ratio `p`.
fn ln_coefficients(count: f64, p: f64, n: usize, out: &mut Vec<f64>) {
    out.clear();
    out.reserve(n + 1);
    let shape_minus_one = count - 0.5;
    let ln_1p = p.ln_1p();
    // ln(p / (1 + p)); -inf at p == 0, which zeroes every k > 0 term.
    let ln_ratio = p.ln() - ln_1p;
    let mut c = -(shape_minus_one + 1.0) * ln_1p;
    out.push(c);
    for k in 1..=n {
        let dk = k as f64;
        c += ln_ratio + ((shape_minus_one + dk) / dk).ln();
        out.push(c);
    }
}

impl PoissonGammaModel {
    /// Build a model from per-bin counts and scale factors.
    ///
    /// `signal_counts`/`signal_scales` are `x`/`a`, `background_counts`/`background_scales`
    /// are `y`/`b`. All four vectors must have the same (non-zero) length.
    pub fn new(
        signal_counts: Vec<f64>,
        signal_scales: Vec<f64>,
        background_counts: Vec<f64>,
        background_scales: Vec<f64>,
    ) -> Result<Self> {
        let n_bins = background_counts.len();
        if n_bins == 0 {
            return Err(Error::Validation("PoissonGammaModel needs at least one bin".to_string()));
        }
        check_len("PoissonGammaModel signal counts", n_bins, signal_counts.len())?;
        check_len("PoissonGammaModel signal scales", n_bins, signal_scales.len())?;
        check_len("PoissonGammaModel background scales", n_bins, background_scales.len())?;
        validate_counts("signal", &signal_counts)?;
        validate_counts("background", &background_counts)?;
        validate_scales("signal", &signal_scales)?;
        validate_scales("background", &background_scales)?;

        Ok(Self {
            signal_counts,
            signal_scales,
            background_counts,
            background_scales,
            max_count: DEFAULT_MAX_COUNT,
            data: None,
        })
    }

    /// Build a model whose scale factors are the same in every bin.
    pub fn with_uniform_scales(
        signal_counts: Vec<f64>,
        signal_scale: f64,
        background_counts: Vec<f64>,
        background_scale: f64,
    ) -> Result<Self> {
        let n = background_counts.len();
        Self::new(signal_counts, vec![signal_scale; n], background_counts, vec![background_scale; n])
    }

    /// Build a model from one swarm point.
    pub fn from_point(point: &SwarmPoint) -> Result<Self> {
        Self::new(
            point.signal_counts.clone(),
            point.signal_scales.clone(),
            point.background_counts.clone(),
            point.background_scales.clone(),
        )
    }

    /// Replace the ceiling on observed counts.
    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    /// Ceiling on a single observed count.
    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Replace the signal prior (`x`, `a`).
    pub fn set_signal_prior(&mut self, counts: Vec<f64>, scales: Vec<f64>) -> Result<()> {
        check_len("PoissonGammaModel signal counts", self.n_bins(), counts.len())?;
        check_len("PoissonGammaModel signal scales", self.n_bins(), scales.len())?;
        validate_counts("signal", &counts)?;
        validate_scales("signal", &scales)?;
        self.signal_counts = counts;
        self.signal_scales = scales;
        Ok(())
    }

    /// Replace the background prior (`y`, `b`).
    pub fn set_background_prior(&mut self, counts: Vec<f64>, scales: Vec<f64>) -> Result<()> {
        check_len("PoissonGammaModel background counts", self.n_bins(), counts.len())?;
        check_len("PoissonGammaModel background scales", self.n_bins(), scales.len())?;
        validate_counts("background", &counts)?;
        validate_scales("background", &scales)?;
        self.background_counts = counts;
        self.background_scales = scales;
        Ok(())
    }

    /// Signal counts `x`.
    pub fn signal_counts(&self) -> &[f64] {
        &self.signal_counts
    }

    /// Signal scale factors `a`.
    pub fn signal_scales(&self) -> &[f64] {
        &self.signal_scales
    }

    /// Background counts `y`.
    pub fn background_counts(&self) -> &[f64] {
        &self.background_counts
    }

    /// Store a dataset for [`PoissonGammaModel::likelihood_cached`].
    pub fn set_data(&mut self, data: &[f64]) -> Result<()> {
        self.check_data(data)?;
        self.data = Some(data.to_vec());
        Ok(())
    }

    /// Likelihood of the stored dataset.
    pub fn likelihood_cached(&self, poi: f64) -> Result<f64> {
        let data = self.data.as_deref().ok_or_else(|| {
            Error::Validation("PoissonGammaModel has no stored dataset".to_string())
        })?;
        self.likelihood(data, poi)
    }

    fn check_data(&self, data: &[f64]) -> Result<()> {
        check_len("PoissonGammaModel data", self.n_bins(), data.len())?;
        for (bin, &n) in data.iter().enumerate() {
            self.check_count(bin, n)?;
        }
        Ok(())
    }

    fn check_count(&self, bin: usize, n: f64) -> Result<()> {
        if !n.is_finite() || n < 0.0 {
            return Err(Error::Validation(format!(
                "observed count in bin {} must be finite and >= 0, got {}",
                bin, n
            )));
        }
        if n > self.max_count as f64 {
            return Err(Error::CountAboveCeiling { bin, count: n, ceiling: self.max_count });
        }
        Ok(())
    }

    fn check_poi(poi: f64) -> Result<()> {
        if !poi.is_finite() || poi < 0.0 {
            return Err(Error::Validation(format!(
                "PoissonGammaModel: poi must be finite and >= 0, got {}",
                poi
            )));
        }
        Ok(())
    }

    /// `ln p(n | poi)` for one bin. The count is truncated to an integer.
    pub fn ln_bin_probability(&self, bin: usize, count: f64, poi: f64) -> Result<f64> {
        if bin >= self.n_bins() {
            return Err(Error::IndexOutOfRange { index: bin, len: self.n_bins() });
        }
        self.check_count(bin, count)?;
        Self::check_poi(poi)?;
        let mut c1 = Vec::new();
        let mut c2 = Vec::new();
        self.ln_bin_probability_with(bin, count, poi, &mut c1, &mut c2)
    }

    fn ln_bin_probability_with(
        &self,
        bin: usize,
        count: f64,
        poi: f64,
        c1: &mut Vec<f64>,
        c2: &mut Vec<f64>,
    ) -> Result<f64> {
        let n = count as usize;
        let p1 = poi / self.signal_scales[bin];
        let p2 = 1.0 / self.background_scales[bin];
        ln_coefficients(self.signal_counts[bin], p1, n, c1);
        ln_coefficients(self.background_counts[bin], p2, n, c2);

        let max = (0..=n).map(|k| c1[k] + c2[n - k]).fold(f64::NEG_INFINITY, f64::max);
        if max == f64::NEG_INFINITY {
            return Ok(f64::NEG_INFINITY);
        }
        let acc: NeumaierSum = (0..=n).map(|k| (c1[k] + c2[n - k] - max).exp()).collect();
        let sum = acc.total();
        let ln_p = max + sum.ln();
        if ln_p.is_nan() || sum < 0.0 {
            return Err(Error::Computation(format!(
                "PoissonGammaModel: invalid probability in bin {} (count = {}, poi = {})",
                bin, count, poi
            )));
        }
        Ok(ln_p)
    }
}

impl ProbabilityModel for PoissonGammaModel {
    fn n_bins(&self) -> usize {
        self.background_counts.len()
    }

    fn generate(&self, poi: f64, rng: &mut dyn RngCore) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.n_bins());
        for bin in 0..self.n_bins() {
            let eps = Gamma::new(self.signal_counts[bin] + 0.5, 1.0 / self.signal_scales[bin])
                .map_err(|e| Error::Computation(format!("signal gamma in bin {}: {}", bin, e)))?
                .sample(rng);
            let mu =
                Gamma::new(self.background_counts[bin] + 0.5, 1.0 / self.background_scales[bin])
                    .map_err(|e| {
                        Error::Computation(format!("background gamma in bin {}: {}", bin, e))
                    })?
                    .sample(rng);
            let mean = poi * eps + mu;
            if !mean.is_finite() || mean <= 0.0 {
                out.push(0.0);
                continue;
            }
            let n = Poisson::new(mean)
                .map_err(|e| Error::Computation(format!("poisson in bin {}: {}", bin, e)))?
                .sample(rng);
            out.push(n);
        }
        Ok(out)
    }

    fn likelihood(&self, data: &[f64], poi: f64) -> Result<f64> {
        Ok(self.ln_likelihood(data, poi)?.exp())
    }

    fn ln_likelihood(&self, data: &[f64], poi: f64) -> Result<f64> {
        Self::check_poi(poi)?;
        self.check_data(data)?;
        let mut c1 = Vec::new();
        let mut c2 = Vec::new();
        let mut total = 0.0;
        for (bin, &n) in data.iter().enumerate() {
            total += self.ln_bin_probability_with(bin, n, poi, &mut c1, &mut c2)?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use statrs::function::gamma::ln_gamma;

    fn single_bin(x: f64, a: f64, y: f64, b: f64) -> PoissonGammaModel {
        PoissonGammaModel::new(vec![x], vec![a], vec![y], vec![b]).unwrap()
    }

    /// Direct evaluation of the convolution without log-space tricks.
    fn naive_bin_probability(n: usize, x: f64, a: f64, y: f64, b: f64, poi: f64) -> f64 {
        let coeffs = |count: f64, p: f64| {
            let a1 = count - 0.5;
            let mut c = vec![(1.0 + p).powf(-(a1 + 1.0))];
            for k in 1..=n {
                let dk = k as f64;
                let prev = c[k - 1];
                c.push(prev * (p / (1.0 + p)) * (a1 + dk) / dk);
            }
            c
        };
        let c1 = coeffs(x, poi / a);
        let c2 = coeffs(y, 1.0 / b);
        (0..=n).map(|k| c1[k] * c2[n - k]).sum()
    }

    #[test]
    fn test_matches_naive_recursion() {
        let m = single_bin(4.0, 2.0, 7.0, 1.5);
        for &n in &[0usize, 1, 5, 17] {
            for &poi in &[0.0, 0.3, 2.0, 11.0] {
                let lp = m.likelihood(&[n as f64], poi).unwrap();
                let naive = naive_bin_probability(n, 4.0, 2.0, 7.0, 1.5, poi);
                assert_relative_eq!(lp, naive, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn test_background_only_is_negative_binomial() {
        // At poi = 0 the signal component is a point mass at 0.
        let (y, b) = (5.0f64, 2.0f64);
        let m = single_bin(3.0, 1.0, y, b);
        let s = y + 0.5;
        let p = 1.0 / b;
        for n in 0..10 {
            let nf = n as f64;
            let ln_nb = ln_gamma(s + nf) - ln_gamma(s) - ln_gamma(nf + 1.0)
                + nf * (p / (1.0 + p)).ln()
                - s * p.ln_1p();
            assert_relative_eq!(m.ln_likelihood(&[nf], 0.0).unwrap(), ln_nb, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let m = single_bin(10.0, 1.0, 5.0, 1.0);
        let total: f64 = (0..400).map(|n| m.likelihood(&[n as f64], 1.3).unwrap()).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_large_counts_stay_finite() {
        let m = single_bin(20_000.0, 1.0, 10_000.0, 1.0);
        let ln_l = m.ln_likelihood(&[30_000.0], 1.0).unwrap();
        assert!(ln_l.is_finite());
        assert!(ln_l < 0.0);
    }

    #[test]
    fn test_count_above_ceiling_is_error() {
        let m = single_bin(1.0, 1.0, 1.0, 1.0).with_max_count(10);
        match m.likelihood(&[11.0], 1.0) {
            Err(Error::CountAboveCeiling { bin, ceiling, .. }) => {
                assert_eq!(bin, 0);
                assert_eq!(ceiling, 10);
            }
            other => panic!("expected CountAboveCeiling, got {:?}", other),
        }
    }

    #[test]
    fn test_configuration_errors() {
        assert!(PoissonGammaModel::new(vec![1.0], vec![1.0, 1.0], vec![1.0], vec![1.0]).is_err());
        assert!(PoissonGammaModel::new(vec![1.0], vec![0.0], vec![1.0], vec![1.0]).is_err());
        assert!(PoissonGammaModel::new(vec![], vec![], vec![], vec![]).is_err());
        let m = single_bin(1.0, 1.0, 1.0, 1.0);
        assert!(matches!(m.likelihood(&[1.0, 2.0], 1.0), Err(Error::BinMismatch { .. })));
        assert!(m.likelihood(&[1.0], -1.0).is_err());
    }

    #[test]
    fn test_bin_probability_validates_inputs() {
        let m = single_bin(1.0, 1.0, 1.0, 1.0).with_max_count(10);
        assert!(matches!(
            m.ln_bin_probability(3, 2.0, 1.0),
            Err(Error::IndexOutOfRange { index: 3, len: 1 })
        ));
        assert!(matches!(m.ln_bin_probability(0, -4.0, 1.0), Err(Error::Validation(_))));
        assert!(matches!(m.ln_bin_probability(0, f64::NAN, 1.0), Err(Error::Validation(_))));
        assert!(matches!(
            m.ln_bin_probability(0, 11.0, 1.0),
            Err(Error::CountAboveCeiling { bin: 0, .. })
        ));
        assert!(m.ln_bin_probability(0, 2.0, -1.0).is_err());

        let single = m.ln_bin_probability(0, 2.0, 1.5).unwrap();
        assert_relative_eq!(single, m.ln_likelihood(&[2.0], 1.5).unwrap(), epsilon = 1e-14);
    }

    #[test]
    fn test_cached_dataset() {
        let mut m = PoissonGammaModel::with_uniform_scales(vec![3.0, 4.0], 1.0, vec![2.0, 1.0], 2.0)
            .unwrap();
        assert!(m.likelihood_cached(1.0).is_err());
        m.set_data(&[3.0, 2.0]).unwrap();
        assert_eq!(m.likelihood_cached(1.0).unwrap(), m.likelihood(&[3.0, 2.0], 1.0).unwrap());
    }

    #[test]
    fn test_set_priors() {
        let mut m = single_bin(1.0, 1.0, 1.0, 1.0);
        m.set_signal_prior(vec![8.0], vec![2.0]).unwrap();
        m.set_background_prior(vec![3.0], vec![4.0]).unwrap();
        assert_eq!(m.signal_counts(), &[8.0]);
        assert_eq!(m.background_counts(), &[3.0]);
        assert!(m.set_signal_prior(vec![8.0, 1.0], vec![2.0, 1.0]).is_err());
    }

    #[test]
    fn test_generate_reproducible() {
        let m = PoissonGammaModel::with_uniform_scales(vec![10.0, 2.0], 1.0, vec![5.0, 8.0], 1.0)
            .unwrap();
        let a = m.generate(2.0, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = m.generate(2.0, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|&n| n >= 0.0 && n.fract() == 0.0));
    }

    #[test]
    fn test_generate_mean() {
        // E[n] = poi * (x + 1/2)/a + (y + 1/2)/b = 2 * 10.5 + 5.5 = 26.5
        let m = single_bin(10.0, 1.0, 5.0, 1.0);
        let mut rng = StdRng::seed_from_u64(123);
        let k = 20_000;
        let mean: f64 =
            (0..k).map(|_| m.generate(2.0, &mut rng).unwrap()[0]).sum::<f64>() / k as f64;
        assert!((mean - 26.5).abs() < 0.3, "mean = {}", mean);
    }
}
