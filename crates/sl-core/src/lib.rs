//! # sl-core
//!
//! Core abstractions for SwarmLimits.
//!
//! Inference engines in `sl-inference` only talk to probability models through
//! the [`ProbabilityModel`] trait defined here, and the ensemble driver only talks
//! to calculators through [`LimitCalculator`]. Concrete models live in `sl-model`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error type and result alias.
pub mod error;
/// Model, prior and calculator traits.
pub mod traits;
/// Fit result types.
pub mod types;
/// Process-wide verbosity level.
pub mod verbosity;

pub use error::{Error, Result};
pub use traits::{LimitCalculator, PriorFunction, ProbabilityModel};
pub use types::FitResult;
pub use verbosity::{set_verbosity, verbosity};
