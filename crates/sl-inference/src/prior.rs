//! Priors on the parameter of interest.

use sl_core::PriorFunction;

/// Prior distribution for the parameter of interest.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Prior {
    /// Flat prior: constant weight 1.
    #[default]
    Flat,
    /// Normal prior: `p(poi) = exp(-0.5 * ((poi - center) / width)^2)` (unnormalized).
    Normal {
        /// Center of the Gaussian prior.
        center: f64,
        /// Width (standard deviation) of the Gaussian prior.
        width: f64,
    },
}

impl PriorFunction for Prior {
    fn density(&self, poi: f64) -> f64 {
        match *self {
            Prior::Flat => 1.0,
            Prior::Normal { center, width } => {
                let pull = (poi - center) / width;
                (-0.5 * pull * pull).exp()
            }
        }
    }
}
