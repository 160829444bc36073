//! Common data types for SwarmLimits

use serde::{Deserialize, Serialize};

/// One-parameter maximum-likelihood fit result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Best-fit value of the poi
    pub poi_hat: f64,

    /// Curvature-based uncertainty on `poi_hat`
    pub poi_err: f64,

    /// Negative log-likelihood at the minimum
    pub nll: f64,

    /// Convergence status
    pub converged: bool,

    /// Number of objective evaluations
    pub n_evaluations: usize,

    /// Termination message from the minimizer
    pub message: String,
}

impl FitResult {
    /// Create a new fit result
    pub fn new(
        poi_hat: f64,
        poi_err: f64,
        nll: f64,
        converged: bool,
        n_evaluations: usize,
    ) -> Self {
        Self { poi_hat, poi_err, nll, converged, n_evaluations, message: String::new() }
    }

    /// Attach the minimizer's termination message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
