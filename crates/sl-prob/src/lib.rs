//! Probability building blocks for SwarmLimits.
//!
//! This crate hosts the scalar probability math shared by the models and the
//! inference engines:
//! - Poisson log-pmf and the standard normal cdf/quantile
//! - gamma moment matching for evidence-based priors
//! - small numeric helpers (compensated summation, log-sum-exp)

pub mod gamma;
pub mod math;
pub mod normal;
pub mod poisson;
