//! Multi-bin Poisson model with known per-bin signal and background.

use rand::RngCore;
use rand_distr::{Distribution, Poisson};
use sl_core::{Error, ProbabilityModel, Result};

/// One swarm point of the plain multi-Poisson model.
///
/// Bin `i` has mean `poi * signal[i] + background[i]`, where `signal` is the
/// effective luminosity (efficiency x integrated luminosity) and `background`
/// the expected background count.
#[derive(Debug, Clone, PartialEq)]
pub struct PoissonPoint {
    signal: Vec<f64>,
    background: Vec<f64>,
}

impl PoissonPoint {
    /// Create a point. Both vectors must have the same non-zero length and
    /// contain finite non-negative values.
    pub fn new(signal: Vec<f64>, background: Vec<f64>) -> Result<Self> {
        if background.is_empty() {
            return Err(Error::Validation("PoissonPoint needs at least one bin".to_string()));
        }
        if signal.len() != background.len() {
            return Err(Error::BinMismatch {
                context: "PoissonPoint signal",
                expected: background.len(),
                got: signal.len(),
            });
        }
        Self::validate("signal", &signal)?;
        Self::validate("background", &background)?;
        Ok(Self { signal, background })
    }

    fn validate(name: &str, values: &[f64]) -> Result<()> {
        match values.iter().position(|v| !v.is_finite() || *v < 0.0) {
            Some(i) => Err(Error::Validation(format!(
                "{} in bin {} must be finite and >= 0, got {}",
                name, i, values[i]
            ))),
            None => Ok(()),
        }
    }

    /// Per-bin signal (effective luminosity).
    pub fn signal(&self) -> &[f64] {
        &self.signal
    }

    /// Per-bin background.
    pub fn background(&self) -> &[f64] {
        &self.background
    }

    /// Replace the signal column.
    pub fn set_signal(&mut self, signal: Vec<f64>) -> Result<()> {
        if signal.len() != self.background.len() {
            return Err(Error::BinMismatch {
                context: "PoissonPoint signal",
                expected: self.background.len(),
                got: signal.len(),
            });
        }
        Self::validate("signal", &signal)?;
        self.signal = signal;
        Ok(())
    }

    /// Expected count per bin at `poi`.
    pub fn expected(&self, poi: f64) -> Vec<f64> {
        self.signal.iter().zip(&self.background).map(|(&s, &b)| poi * s + b).collect()
    }
}

/// Draw a Poisson count for every expected value. Non-positive means give 0.
pub(crate) fn poisson_counts(means: &[f64], rng: &mut dyn RngCore) -> Result<Vec<f64>> {
    means
        .iter()
        .map(|&lam| {
            if !lam.is_finite() || lam <= 0.0 {
                return Ok(0.0);
            }
            let pois = Poisson::new(lam)
                .map_err(|e| Error::Computation(format!("Poisson::new({}): {}", lam, e)))?;
            Ok(pois.sample(rng))
        })
        .collect()
}

impl ProbabilityModel for PoissonPoint {
    fn n_bins(&self) -> usize {
        self.background.len()
    }

    fn generate(&self, poi: f64, rng: &mut dyn RngCore) -> Result<Vec<f64>> {
        poisson_counts(&self.expected(poi), rng)
    }

    fn likelihood(&self, data: &[f64], poi: f64) -> Result<f64> {
        Ok(self.ln_likelihood(data, poi)?.exp())
    }

    fn ln_likelihood(&self, data: &[f64], poi: f64) -> Result<f64> {
        if data.len() != self.n_bins() {
            return Err(Error::BinMismatch {
                context: "PoissonPoint data",
                expected: self.n_bins(),
                got: data.len(),
            });
        }
        let ln_l = sl_prob::poisson::ln_product(data, &self.expected(poi));
        if ln_l.is_nan() {
            return Err(Error::Computation(format!(
                "PoissonPoint: NaN likelihood at poi = {}",
                poi
            )));
        }
        Ok(ln_l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_likelihood_is_product_of_poissons() {
        let p = PoissonPoint::new(vec![1.0, 2.0], vec![0.5, 3.0]).unwrap();
        let l = p.likelihood(&[2.0, 4.0], 1.5).unwrap();
        let expected = sl_prob::poisson::pmf(2.0, 2.0) * sl_prob::poisson::pmf(4.0, 6.0);
        assert_relative_eq!(l, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_zero_background_zero_poi() {
        let p = PoissonPoint::new(vec![1.0], vec![0.0]).unwrap();
        assert_eq!(p.likelihood(&[0.0], 0.0).unwrap(), 1.0);
        assert_eq!(p.likelihood(&[1.0], 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_validation() {
        assert!(PoissonPoint::new(vec![1.0], vec![1.0, 2.0]).is_err());
        assert!(PoissonPoint::new(vec![-1.0], vec![1.0]).is_err());
        let mut p = PoissonPoint::new(vec![1.0], vec![1.0]).unwrap();
        assert!(p.set_signal(vec![1.0, 1.0]).is_err());
        p.set_signal(vec![4.0]).unwrap();
        assert_eq!(p.expected(2.0), vec![9.0]);
    }

    #[test]
    fn test_generate_seeded() {
        let p = PoissonPoint::new(vec![10.0, 0.0], vec![5.0, 0.0]).unwrap();
        let a = p.generate(1.0, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = p.generate(1.0, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[1], 0.0);
    }
}
