//! Bounded one-dimensional minimization
//!
//! Thin wrapper around argmin's Brent minimizer with a clean interface: the
//! objective is any closure `f64 -> Result<f64>`, so engines can capture their
//! model and dataset instead of going through shared mutable state.

use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::brent::BrentOpt;
use sl_core::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Objective values above this are clamped so Brent's parabolic steps stay finite.
const COST_CEILING: f64 = 1e150;

/// Configuration for the Brent minimizer
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Absolute tolerance on the location of the minimum
    pub tol: f64,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self { max_iter: 500, tol: 1e-10 }
    }
}

/// Result of a bounded minimization
#[derive(Debug, Clone)]
pub struct MinimizeResult {
    /// Location of the minimum
    pub x: f64,
    /// Function value at the minimum
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective evaluations
    pub n_fev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for MinimizeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MinimizeResult(x={:.6}, fval={:.6}, n_iter={}, n_fev={}, converged={})",
            self.x, self.fval, self.n_iter, self.n_fev, self.converged
        )
    }
}

/// Wrapper to make a scalar closure compatible with argmin
struct ArgminProblem<'a> {
    objective: &'a dyn Fn(f64) -> Result<f64>,
    counts: Arc<AtomicUsize>,
}

impl<'a> CostFunction for ArgminProblem<'a> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.fetch_add(1, Ordering::Relaxed);
        let v = (self.objective)(*x).map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        if v.is_nan() || v > COST_CEILING {
            return Ok(COST_CEILING);
        }
        Ok(v)
    }
}

/// Minimize `objective` over `[lo, hi]`.
///
/// Non-convergence is not an error: it is reported through
/// [`MinimizeResult::converged`] and the best point seen is returned.
pub fn minimize_bounded(
    objective: &dyn Fn(f64) -> Result<f64>,
    lo: f64,
    hi: f64,
    config: &MinimizerConfig,
) -> Result<MinimizeResult> {
    if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        return Err(Error::Validation(format!("invalid minimization interval [{}, {}]", lo, hi)));
    }

    let counts = Arc::new(AtomicUsize::new(0));
    let problem = ArgminProblem { objective, counts: counts.clone() };
    let solver = BrentOpt::new(lo, hi).set_tolerance(f64::EPSILON.sqrt(), config.tol);

    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(config.max_iter))
        .run()
        .map_err(|e| Error::Computation(format!("Minimization failed: {}", e)))?;

    let state = res.state();
    let x = *state
        .get_best_param()
        .ok_or_else(|| Error::Computation("No best parameter found".to_string()))?;
    let termination = state.get_termination_status();
    let converged =
        matches!(termination, TerminationStatus::Terminated(TerminationReason::SolverConverged));

    Ok(MinimizeResult {
        x: x.clamp(lo, hi),
        fval: state.get_best_cost(),
        n_iter: state.get_iter(),
        n_fev: counts.load(Ordering::Relaxed),
        converged,
        message: termination.to_string(),
    })
}

/// Numerical second derivative of `f` at `x` with step `h`, staying inside `[lo, hi]`.
///
/// Uses the central 3-point stencil when both neighbours are in range and the
/// one-sided (forward or backward) 3-point stencil at the edges.
pub fn second_derivative(
    f: &dyn Fn(f64) -> Result<f64>,
    x: f64,
    h: f64,
    lo: f64,
    hi: f64,
) -> Result<f64> {
    if x - h < lo {
        second_derivative_forward(f, x, h)
    } else if x + h > hi {
        second_derivative_forward(f, x, -h)
    } else {
        let f0 = f(x)?;
        let fp = f(x + h)?;
        let fm = f(x - h)?;
        Ok((fp - 2.0 * f0 + fm) / (h * h))
    }
}

/// Forward 3-point second derivative `(f(x) - 2 f(x+h) + f(x+2h)) / h^2`.
///
/// A negative `h` gives the backward stencil.
pub fn second_derivative_forward(f: &dyn Fn(f64) -> Result<f64>, x: f64, h: f64) -> Result<f64> {
    let f0 = f(x)?;
    let f1 = f(x + h)?;
    let f2 = f(x + 2.0 * h)?;
    Ok((f0 - 2.0 * f1 + f2) / (h * h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_minimize_quadratic() {
        let f = |x: f64| -> Result<f64> { Ok((x - 2.0).powi(2) - 5.0) };
        let result = minimize_bounded(&f, -10.0, 10.0, &MinimizerConfig::default()).unwrap();

        println!("{}", result);

        assert!(result.converged, "Minimizer should converge: {}", result.message);
        assert_relative_eq!(result.x, 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.fval, -5.0, epsilon = 1e-10);
        assert!(result.n_fev > 0);
    }

    #[test]
    fn test_minimum_outside_bounds() {
        // Unconstrained minimum at -1; constrained minimum at the lower bound.
        let f = |x: f64| -> Result<f64> { Ok((x + 1.0).powi(2)) };
        let result = minimize_bounded(&f, 0.0, 10.0, &MinimizerConfig::default()).unwrap();
        assert_relative_eq!(result.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(result.fval, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_infinite_cost_is_clamped() {
        // Infinite at x <= 0, like a Poisson NLL with zero background.
        let f = |x: f64| -> Result<f64> { Ok(if x <= 0.0 { f64::INFINITY } else { x - 3.0 * x.ln() }) };
        let result = minimize_bounded(&f, 0.0, 20.0, &MinimizerConfig::default()).unwrap();
        assert_relative_eq!(result.x, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_objective_error_propagates() {
        let f = |_x: f64| -> Result<f64> { Err(Error::Computation("broken".to_string())) };
        assert!(minimize_bounded(&f, 0.0, 1.0, &MinimizerConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_interval() {
        let f = |x: f64| -> Result<f64> { Ok(x) };
        assert!(minimize_bounded(&f, 1.0, 1.0, &MinimizerConfig::default()).is_err());
        assert!(minimize_bounded(&f, f64::NAN, 1.0, &MinimizerConfig::default()).is_err());
    }

    #[test]
    fn test_second_derivative_stencils() {
        let f = |x: f64| -> Result<f64> { Ok(3.0 * x * x + x) };
        assert_relative_eq!(second_derivative(&f, 1.0, 1e-3, 0.0, 2.0).unwrap(), 6.0, epsilon = 1e-5);
        // At the edges the one-sided stencils are used.
        assert_relative_eq!(second_derivative(&f, 0.0, 1e-3, 0.0, 2.0).unwrap(), 6.0, epsilon = 1e-5);
        assert_relative_eq!(second_derivative(&f, 2.0, 1e-3, 0.0, 2.0).unwrap(), 6.0, epsilon = 1e-5);
        assert_relative_eq!(second_derivative_forward(&f, 0.5, 1e-3).unwrap(), 6.0, epsilon = 1e-5);
    }
}
