//! Small numerically-stable math utilities used across probability code.

/// Neumaier (improved Kahan) compensated summation.
///
/// Used where long sums of terms of similar magnitude but alternating scale
/// would otherwise lose digits, e.g. the Poisson-Gamma convolution sum.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeumaierSum {
    sum: f64,
    compensation: f64,
}

impl NeumaierSum {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one term.
    #[inline]
    pub fn add(&mut self, x: f64) {
        let t = self.sum + x;
        if self.sum.abs() >= x.abs() {
            self.compensation += (self.sum - t) + x;
        } else {
            self.compensation += (x - t) + self.sum;
        }
        self.sum = t;
    }

    /// Compensated total.
    #[inline]
    pub fn total(&self) -> f64 {
        self.sum + self.compensation
    }
}

impl FromIterator<f64> for NeumaierSum {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = Self::new();
        for x in iter {
            acc.add(x);
        }
        acc
    }
}

/// Stable `log(sum(exp(x_i)))`.
///
/// Returns `-inf` for an empty slice or when every term is `-inf`.
pub fn log_sum_exp(xs: &[f64]) -> f64 {
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let acc: NeumaierSum = xs.iter().map(|&x| (x - max).exp()).collect();
    max + acc.total().ln()
}

/// Stable `log(mean(exp(x_i)))`.
pub fn log_mean_exp(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NEG_INFINITY;
    }
    log_sum_exp(xs) - (xs.len() as f64).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neumaier_recovers_small_terms() {
        // Naive summation loses the 1.0 entirely.
        let xs = [1e100, 1.0, -1e100];
        let naive: f64 = xs.iter().sum();
        assert_eq!(naive, 0.0);
        let acc: NeumaierSum = xs.iter().copied().collect();
        assert_eq!(acc.total(), 1.0);
    }

    #[test]
    fn test_log_sum_exp_matches_naive_moderate_values() {
        let xs = [-1.0, 0.5, 2.0, -3.0];
        let naive = xs.iter().map(|x: &f64| x.exp()).sum::<f64>().ln();
        assert!((log_sum_exp(&xs) - naive).abs() < 1e-12);
    }

    #[test]
    fn test_log_sum_exp_extremes() {
        let xs = [-1000.0, -1000.0];
        let v = log_sum_exp(&xs);
        assert!((v - (-1000.0 + 2f64.ln())).abs() < 1e-12, "{}", v);
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY, f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_log_mean_exp_of_identical_terms() {
        let xs = vec![-42.0; 100];
        assert!((log_mean_exp(&xs) + 42.0).abs() < 1e-12);
    }
}
