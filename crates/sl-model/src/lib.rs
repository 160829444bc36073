//! # sl-model
//!
//! Counting models for SwarmLimits.
//!
//! Every model implements [`sl_core::ProbabilityModel`]:
//! - [`PoissonPoint`]: multi-bin Poisson with known signal efficiency and background
//! - [`PoissonGammaModel`]: multi-bin Poisson with gamma-marginalized efficiency and background
//! - [`SwarmModel`]: average over a swarm of points drawn from a nuisance prior
//!   ([`MultiPoisson`], [`MultiPoissonGamma`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod poisson_gamma;
pub mod poisson_point;
pub mod swarm;

pub use poisson_gamma::{DEFAULT_MAX_COUNT, PoissonGammaModel};
pub use poisson_point::PoissonPoint;
pub use swarm::{MultiPoisson, MultiPoissonGamma, SwarmModel, SwarmPoint, sample_poisson_swarm};
