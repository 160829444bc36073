//! Normal distribution utilities.

use sl_core::{Error, Result};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erfc;

/// Standard normal CDF `Φ(x)`.
#[inline]
pub fn cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Standard normal survival function `1 - Φ(x)`, accurate in the upper tail.
#[inline]
pub fn sf(x: f64) -> f64 {
    0.5 * erfc(x / std::f64::consts::SQRT_2)
}

/// Standard normal quantile `Φ⁻¹(p)` for `p` in `(0, 1)`.
pub fn quantile(p: f64) -> Result<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(Error::Validation(format!("probability must be in (0, 1), got {}", p)));
    }
    let n = Normal::new(0.0, 1.0).map_err(|e| Error::Computation(e.to_string()))?;
    Ok(n.inverse_cdf(p))
}

/// Two-sided z for a central interval with coverage `cl`: `Φ⁻¹((1 + cl) / 2)`.
pub fn two_sided_z(cl: f64) -> Result<f64> {
    quantile(0.5 * (1.0 + cl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cdf_known_values() {
        assert_relative_eq!(cdf(0.0), 0.5, epsilon = 1e-15);
        assert_relative_eq!(cdf(1.959_963_984_540_054), 0.975, max_relative = 1e-10);
        assert_relative_eq!(cdf(1.3) + sf(1.3), 1.0, epsilon = 1e-15);
        assert!(sf(40.0) > 0.0);
    }

    #[test]
    fn test_quantile_inverts_cdf() {
        for &p in &[0.023, 0.1579, 0.5, 0.8415, 0.977] {
            let z = quantile(p).unwrap();
            assert_relative_eq!(cdf(z), p, epsilon = 1e-9);
        }
        assert_relative_eq!(two_sided_z(0.6827).unwrap(), 1.0, epsilon = 1e-3);
        assert!(quantile(0.0).is_err());
        assert!(quantile(1.0).is_err());
    }
}
