//! Gamma distribution utilities.

/// Floor applied to non-positive estimates before moment matching.
pub const ESTIMATE_FLOOR: f64 = 1e-3;

/// Floor applied to non-positive uncertainties before moment matching.
pub const UNCERTAINTY_FLOOR: f64 = 1e-4;

/// Gamma density matched to an estimate `c ± δc`.
///
/// The density `Gamma(shape = γ, scale = β)` is chosen so that its **mode** is
/// `c` and its **variance** is `δc²`:
///
/// ```text
/// k = (c / δc)^2
/// γ = [k + 2 + sqrt((k + 2)^2 - 4)] / 2
/// β = [sqrt(c^2 + 4 δc^2) - c] / 2
/// ```
///
/// The same prior is also described by an effective count `γ - 1` and a scale
/// factor `1 / β`, which is how the Poisson-Gamma models consume it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaConstants {
    /// Shape `γ`.
    pub shape: f64,
    /// Scale `β`.
    pub scale: f64,
}

impl GammaConstants {
    /// Moment-match an estimate and its uncertainty.
    ///
    /// Non-positive (or non-finite) `c` and `δc` are replaced by
    /// [`ESTIMATE_FLOOR`] and [`UNCERTAINTY_FLOOR`] so the prior stays proper.
    pub fn from_estimate(estimate: f64, uncertainty: f64) -> Self {
        let c = if estimate.is_finite() && estimate > 0.0 { estimate } else { ESTIMATE_FLOOR };
        let dc = if uncertainty.is_finite() && uncertainty > 0.0 {
            uncertainty
        } else {
            UNCERTAINTY_FLOOR
        };
        let k = (c / dc).powi(2);
        let shape = 0.5 * (k + 2.0 + ((k + 2.0).powi(2) - 4.0).sqrt());
        let scale = 0.5 * ((c * c + 4.0 * dc * dc).sqrt() - c);
        Self { shape, scale }
    }

    /// Effective count `γ - 1`.
    pub fn count(&self) -> f64 {
        self.shape - 1.0
    }

    /// Effective scale factor `1 / β`.
    pub fn scale_factor(&self) -> f64 {
        1.0 / self.scale
    }

    /// Mode `(γ - 1) β`.
    pub fn mode(&self) -> f64 {
        (self.shape - 1.0).max(0.0) * self.scale
    }

    /// Mean `γ β`.
    pub fn mean(&self) -> f64 {
        self.shape * self.scale
    }

    /// Variance `γ β^2`.
    pub fn variance(&self) -> f64 {
        self.shape * self.scale * self.scale
    }
}
