//! Bracketing root finder (argmin's Brent root solver).

use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::brent::BrentRoot;
use serde::{Deserialize, Serialize};
use sl_core::{Error, Result};
use std::fmt;

/// Configuration for the Brent root finder
#[derive(Debug, Clone, PartialEq)]
pub struct RootConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Absolute tolerance on the root
    pub tol: f64,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self { max_iter: 200, tol: 1e-10 }
    }
}

/// Outcome of a root search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootStatus {
    /// A root was found within tolerance
    Converged,
    /// `f(lo)` and `f(hi)` have the same sign (or are not finite)
    NotBracketed,
    /// Iteration budget exhausted
    MaxIterations,
}

impl fmt::Display for RootStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::NotBracketed => write!(f, "root not bracketed"),
            Self::MaxIterations => write!(f, "maximum number of iterations reached"),
        }
    }
}

/// Result of a root search
#[derive(Debug, Clone)]
pub struct RootResult {
    /// Root estimate (`NaN` when not bracketed)
    pub x: f64,
    /// `|f(x)|`
    pub residual: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Status
    pub status: RootStatus,
}

impl RootResult {
    /// `true` when the root can be trusted.
    pub fn converged(&self) -> bool {
        self.status == RootStatus::Converged
    }
}

struct ArgminProblem<'a> {
    f: &'a dyn Fn(f64) -> Result<f64>,
}

impl<'a> CostFunction for ArgminProblem<'a> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        (self.f)(*x).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

/// Find a root of `f` in `[lo, hi]`.
///
/// Errors from `f` propagate; a missing bracket is reported through
/// [`RootResult::status`].
pub fn find_root(
    f: &dyn Fn(f64) -> Result<f64>,
    lo: f64,
    hi: f64,
    config: &RootConfig,
) -> Result<RootResult> {
    if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        return Err(Error::Validation(format!("invalid root bracket [{}, {}]", lo, hi)));
    }

    let f_lo = f(lo)?;
    let f_hi = f(hi)?;
    if f_lo == 0.0 {
        return Ok(RootResult { x: lo, residual: 0.0, n_iter: 0, status: RootStatus::Converged });
    }
    if f_hi == 0.0 {
        return Ok(RootResult { x: hi, residual: 0.0, n_iter: 0, status: RootStatus::Converged });
    }
    if !(f_lo.is_finite() && f_hi.is_finite()) || f_lo.signum() == f_hi.signum() {
        return Ok(RootResult {
            x: f64::NAN,
            residual: f64::NAN,
            n_iter: 0,
            status: RootStatus::NotBracketed,
        });
    }

    let solver = BrentRoot::new(lo, hi, config.tol);
    let res = Executor::new(ArgminProblem { f }, solver)
        .configure(|state| state.max_iters(config.max_iter))
        .run()
        .map_err(|e| Error::Computation(format!("Root finding failed: {}", e)))?;

    let state = res.state();
    let x = *state
        .get_best_param()
        .ok_or_else(|| Error::Computation("No root estimate found".to_string()))?;
    let status = match state.get_termination_status() {
        TerminationStatus::Terminated(TerminationReason::SolverConverged) => RootStatus::Converged,
        _ => RootStatus::MaxIterations,
    };

    Ok(RootResult { x, residual: state.get_best_cost().abs(), n_iter: state.get_iter(), status })
}
