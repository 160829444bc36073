//! Tabulated cumulative posterior.

use serde::{Deserialize, Serialize};
use sl_core::{Error, Result};

/// Cumulative posterior on an equally spaced grid.
///
/// `poi` is strictly increasing, `cumulative` is non-decreasing with first
/// entry 0 and last entry 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosteriorTable {
    poi: Vec<f64>,
    cumulative: Vec<f64>,
}

impl PosteriorTable {
    /// Build a table from unnormalized cumulative integrals starting at `start`
    /// with node spacing `step`.
    pub fn from_cumulative(start: f64, step: f64, mut cumulative: Vec<f64>) -> Result<Self> {
        if cumulative.len() < 2 || !(step > 0.0 && step.is_finite()) {
            return Err(Error::Validation(format!(
                "posterior table needs >= 2 nodes and a positive step (got {} nodes, step {})",
                cumulative.len(),
                step
            )));
        }
        let total = cumulative[cumulative.len() - 1];
        if !(total > 0.0 && total.is_finite()) {
            return Err(Error::Computation(format!("posterior integral is {}", total)));
        }
        for c in cumulative.iter_mut() {
            *c /= total;
        }
        let last = cumulative.len() - 1;
        cumulative[0] = 0.0;
        cumulative[last] = 1.0;

        let poi = (0..cumulative.len()).map(|j| start + j as f64 * step).collect();
        Ok(Self { poi, cumulative })
    }

    /// Grid nodes
    pub fn poi(&self) -> &[f64] {
        &self.poi
    }

    /// Cumulative probability at each node
    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.poi.len()
    }

    /// Always `false` for a constructed table
    pub fn is_empty(&self) -> bool {
        self.poi.is_empty()
    }

    /// First and last node
    pub fn support(&self) -> (f64, f64) {
        (self.poi[0], self.poi[self.poi.len() - 1])
    }

    /// Linear interpolation of the cumulative probability, clamped to `[0, 1]` outside the grid.
    pub fn interpolate(&self, x: f64) -> f64 {
        let (lo, hi) = self.support();
        if x <= lo {
            return 0.0;
        }
        if x >= hi {
            return 1.0;
        }
        let j = self.poi.partition_point(|&p| p <= x);
        let (x0, x1) = (self.poi[j - 1], self.poi[j]);
        let (c0, c1) = (self.cumulative[j - 1], self.cumulative[j]);
        c0 + (x - x0) / (x1 - x0) * (c1 - c0)
    }
}
