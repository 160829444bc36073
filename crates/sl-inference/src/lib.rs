//! # sl-inference
//!
//! Limit calculators for SwarmLimits.
//!
//! This crate provides:
//! - Bayesian limits from the one-dimensional posterior ([`Bayes`])
//! - Wald-approximation limits ([`Wald`])
//! - Asymptotic CLs limits ([`AsymptoticCls`])
//! - Expected limits from pseudo-experiments ([`ExpectedLimits`])
//!
//! ## Architecture
//!
//! Calculators borrow any `sl_core::ProbabilityModel` and implement
//! `sl_core::LimitCalculator`; the ensemble driver depends only on that trait.
//! Numerical building blocks (bounded minimizer, root finder, quadrature) are
//! plain functions over `f64 -> Result<f64>` closures.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Bayesian posterior, quantiles and MAP estimate.
pub mod bayes;
/// Expected-limit ensembles (sequential and rayon-parallel).
pub mod expected;
/// Asymptotic CLs hypothesis tests.
pub mod hypotest;
/// Maximum-likelihood fit of the poi.
pub mod mle;
/// Bounded 1-D minimizer (argmin Brent) and finite-difference curvature.
pub mod optimizer;
/// Cumulative posterior table.
pub mod posterior;
/// Priors on the poi.
pub mod prior;
/// Adaptive Gauss-Legendre and cumulative Simpson quadrature.
pub mod quadrature;
/// Bracketing root finder (argmin Brent).
pub mod roots;
/// Wald-approximation limits.
pub mod wald;

pub use bayes::{Bayes, BayesConfig, MapEstimate};
pub use expected::{DEFAULT_PROBABILITIES, EnsembleConfig, EnsembleResult, ExpectedLimits};
pub use hypotest::{AsymptoticCls, HypotestResult};
pub use mle::{FitConfig, MaximumLikelihoodEstimator};
pub use optimizer::{MinimizeResult, MinimizerConfig, minimize_bounded};
pub use posterior::PosteriorTable;
pub use prior::Prior;
pub use quadrature::{Integrator, QuadratureConfig};
pub use roots::{RootConfig, RootResult, RootStatus, find_root};
pub use wald::Wald;
