//! Swarm-averaged models.
//!
//! An evidence-based nuisance prior is represented by a finite sample of points
//! (a "swarm"). The model likelihood is the unweighted average of the per-point
//! likelihoods; pseudo-data come from a single point drawn uniformly from the
//! swarm. A point can be pinned to study one systematic variation in isolation.

use std::ops::Range;

use rand::{Rng, RngCore};
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};
use sl_core::{Error, ProbabilityModel, Result};
use sl_prob::gamma::GammaConstants;
use sl_prob::math::log_mean_exp;

use crate::poisson_gamma::PoissonGammaModel;
use crate::poisson_point::{PoissonPoint, poisson_counts};

/// One swarm point for the Poisson-Gamma model: per-bin gamma count/scale pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmPoint {
    /// Signal counts `x`.
    pub signal_counts: Vec<f64>,
    /// Signal scale factors `a`.
    pub signal_scales: Vec<f64>,
    /// Background counts `y`.
    pub background_counts: Vec<f64>,
    /// Background scale factors `b`.
    pub background_scales: Vec<f64>,
}

impl SwarmPoint {
    /// Point given directly as counts and scale factors.
    pub fn from_counts(
        signal_counts: Vec<f64>,
        signal_scales: Vec<f64>,
        background_counts: Vec<f64>,
        background_scales: Vec<f64>,
    ) -> Self {
        Self { signal_counts, signal_scales, background_counts, background_scales }
    }

    /// Point given as per-bin estimates and uncertainties, moment-matched to gamma
    /// densities (count `γ - 1`, scale factor `1 / β`).
    pub fn from_estimates(
        signal: &[f64],
        signal_err: &[f64],
        background: &[f64],
        background_err: &[f64],
    ) -> Result<Self> {
        let n = background.len();
        for (context, got) in [
            ("SwarmPoint signal", signal.len()),
            ("SwarmPoint signal uncertainty", signal_err.len()),
            ("SwarmPoint background uncertainty", background_err.len()),
        ] {
            if got != n {
                return Err(Error::BinMismatch { context, expected: n, got });
            }
        }
        let sig: Vec<GammaConstants> = signal
            .iter()
            .zip(signal_err)
            .map(|(&c, &dc)| GammaConstants::from_estimate(c, dc))
            .collect();
        let bkg: Vec<GammaConstants> = background
            .iter()
            .zip(background_err)
            .map(|(&c, &dc)| GammaConstants::from_estimate(c, dc))
            .collect();
        Ok(Self {
            signal_counts: sig.iter().map(GammaConstants::count).collect(),
            signal_scales: sig.iter().map(GammaConstants::scale_factor).collect(),
            background_counts: bkg.iter().map(GammaConstants::count).collect(),
            background_scales: bkg.iter().map(GammaConstants::scale_factor).collect(),
        })
    }
}

/// A swarm of models averaged in likelihood.
#[derive(Debug, Clone)]
pub struct SwarmModel<P> {
    points: Vec<P>,
    n_bins: usize,
    pinned: Option<usize>,
    profile: bool,
}

/// Swarm of plain Poisson points.
pub type MultiPoisson = SwarmModel<PoissonPoint>;

/// Swarm of Poisson-Gamma points.
pub type MultiPoissonGamma = SwarmModel<PoissonGammaModel>;

impl<P: ProbabilityModel> Default for SwarmModel<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ProbabilityModel> SwarmModel<P> {
    /// Empty swarm. The bin count is fixed by the first point added.
    pub fn new() -> Self {
        Self { points: Vec::new(), n_bins: 0, pinned: None, profile: false }
    }

    /// Swarm built from a list of points.
    pub fn from_points(points: Vec<P>) -> Result<Self> {
        let mut swarm = Self::new();
        for p in points {
            swarm.add(p)?;
        }
        Ok(swarm)
    }

    /// Append a point. Its bin count must match the swarm's.
    pub fn add(&mut self, point: P) -> Result<()> {
        if self.points.is_empty() {
            self.n_bins = point.n_bins();
        } else if point.n_bins() != self.n_bins {
            return Err(Error::BinMismatch {
                context: "SwarmModel::add",
                expected: self.n_bins,
                got: point.n_bins(),
            });
        }
        self.points.push(point);
        Ok(())
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// `true` when the swarm has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point at `index`.
    pub fn get(&self, index: usize) -> Option<&P> {
        self.points.get(index)
    }

    /// All points.
    pub fn points(&self) -> &[P] {
        &self.points
    }

    /// Restrict likelihood and generation to a single point.
    pub fn pin(&mut self, index: usize) -> Result<()> {
        if index >= self.points.len() {
            return Err(Error::IndexOutOfRange { index, len: self.points.len() });
        }
        self.pinned = Some(index);
        Ok(())
    }

    /// Return to averaging over the whole swarm.
    pub fn reset(&mut self) {
        self.pinned = None;
    }

    /// Pinned point, if any.
    pub fn pinned(&self) -> Option<usize> {
        self.pinned
    }

    /// Request profiling instead of averaging.
    ///
    /// Profiling over the swarm is not defined; the flag is stored and the
    /// model keeps averaging.
    pub fn set_profile(&mut self, profile: bool) {
        self.profile = profile;
    }

    /// Whether profiling was requested.
    pub fn profile(&self) -> bool {
        self.profile
    }

    fn active(&self) -> Result<Range<usize>> {
        if self.points.is_empty() {
            return Err(Error::EmptySwarm("no swarm points were added"));
        }
        Ok(match self.pinned {
            Some(i) => i..i + 1,
            None => 0..self.points.len(),
        })
    }

    fn point_mut(&mut self, index: usize) -> Result<&mut P> {
        let len = self.points.len();
        self.points.get_mut(index).ok_or(Error::IndexOutOfRange { index, len })
    }
}

impl<P: ProbabilityModel> ProbabilityModel for SwarmModel<P> {
    fn n_bins(&self) -> usize {
        self.n_bins
    }

    fn generate(&self, poi: f64, rng: &mut dyn RngCore) -> Result<Vec<f64>> {
        let range = self.active()?;
        let index = match self.pinned {
            Some(i) => i,
            None => rng.random_range(range),
        };
        self.points[index].generate(poi, rng)
    }

    fn likelihood(&self, data: &[f64], poi: f64) -> Result<f64> {
        Ok(self.ln_likelihood(data, poi)?.exp())
    }

    fn ln_likelihood(&self, data: &[f64], poi: f64) -> Result<f64> {
        let range = self.active()?;
        if data.len() != self.n_bins {
            return Err(Error::BinMismatch {
                context: "SwarmModel data",
                expected: self.n_bins,
                got: data.len(),
            });
        }
        let terms = self.points[range]
            .iter()
            .map(|p| p.ln_likelihood(data, poi))
            .collect::<Result<Vec<f64>>>()?;
        Ok(log_mean_exp(&terms))
    }
}

impl SwarmModel<PoissonPoint> {
    /// Append a point given its per-bin signal and background.
    pub fn add_point(&mut self, signal: Vec<f64>, background: Vec<f64>) -> Result<()> {
        self.add(PoissonPoint::new(signal, background)?)
    }

    /// Replace the signal column of point `index`.
    pub fn update(&mut self, index: usize, signal: Vec<f64>) -> Result<()> {
        self.point_mut(index)?.set_signal(signal)
    }

    /// Per-bin mean signal and background over the whole swarm.
    pub fn means(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        if self.points.is_empty() {
            return Err(Error::EmptySwarm("cannot average an empty swarm"));
        }
        let m = self.points.len() as f64;
        let mut signal = vec![0.0; self.n_bins];
        let mut background = vec![0.0; self.n_bins];
        for p in &self.points {
            for (acc, v) in signal.iter_mut().zip(p.signal()) {
                *acc += v;
            }
            for (acc, v) in background.iter_mut().zip(p.background()) {
                *acc += v;
            }
        }
        signal.iter_mut().chain(background.iter_mut()).for_each(|v| *v /= m);
        Ok((signal, background))
    }

    /// Generate one experiment from the swarm-mean signal and background.
    pub fn generate_using_means(&self, poi: f64, rng: &mut dyn RngCore) -> Result<Vec<f64>> {
        let (signal, background) = self.means()?;
        let means: Vec<f64> = signal.iter().zip(&background).map(|(&s, &b)| poi * s + b).collect();
        poisson_counts(&means, rng)
    }
}

impl SwarmModel<PoissonGammaModel> {
    /// Append a point built from a [`SwarmPoint`].
    pub fn add_point(&mut self, point: &SwarmPoint) -> Result<()> {
        self.add(PoissonGammaModel::from_point(point)?)
    }

    /// Replace the signal prior of point `index`, keeping its scale factors.
    pub fn update(&mut self, index: usize, signal_counts: Vec<f64>) -> Result<()> {
        let model = self.point_mut(index)?;
        let scales = model.signal_scales().to_vec();
        model.set_signal_prior(signal_counts, scales)
    }
}

/// Build a [`MultiPoisson`] swarm by sampling `n` points from moment-matched gamma
/// priors on the per-bin effective luminosity (`eff ± deff`) and background
/// (`bkg ± dbkg`).
///
/// Points are drawn from `Gamma(γ, β)` whose mode is the estimate and whose
/// variance is the squared uncertainty.
pub fn sample_poisson_swarm(
    eff: &[f64],
    deff: &[f64],
    bkg: &[f64],
    dbkg: &[f64],
    n: usize,
    rng: &mut dyn RngCore,
) -> Result<MultiPoisson> {
    if n == 0 {
        return Err(Error::EmptySwarm("requested a swarm of size 0"));
    }
    let nb = bkg.len();
    for (context, got) in [
        ("sample_poisson_swarm eff", eff.len()),
        ("sample_poisson_swarm deff", deff.len()),
        ("sample_poisson_swarm dbkg", dbkg.len()),
    ] {
        if got != nb {
            return Err(Error::BinMismatch { context, expected: nb, got });
        }
    }

    let to_gamma = |c: f64, dc: f64| {
        let g = GammaConstants::from_estimate(c, dc);
        Gamma::new(g.shape, g.scale).map_err(|e| Error::Computation(format!("Gamma::new: {}", e)))
    };
    let sig = eff.iter().zip(deff).map(|(&c, &dc)| to_gamma(c, dc)).collect::<Result<Vec<_>>>()?;
    let bg = bkg.iter().zip(dbkg).map(|(&c, &dc)| to_gamma(c, dc)).collect::<Result<Vec<_>>>()?;

    let mut swarm = MultiPoisson::new();
    for _ in 0..n {
        let s: Vec<f64> = sig.iter().map(|g| g.sample(rng)).collect();
        let b: Vec<f64> = bg.iter().map(|g| g.sample(rng)).collect();
        swarm.add_point(s, b)?;
    }
    log::debug!("sampled a swarm of {} points over {} bins", n, nb);
    Ok(swarm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn two_point_swarm() -> MultiPoisson {
        let mut s = MultiPoisson::new();
        s.add_point(vec![1.0, 2.0], vec![3.0, 1.0]).unwrap();
        s.add_point(vec![2.0, 1.0], vec![1.0, 2.0]).unwrap();
        s
    }

    #[test]
    fn test_likelihood_is_arithmetic_mean() {
        let s = two_point_swarm();
        let data = [4.0, 3.0];
        let l0 = s.get(0).unwrap().likelihood(&data, 1.5).unwrap();
        let l1 = s.get(1).unwrap().likelihood(&data, 1.5).unwrap();
        assert_relative_eq!(s.likelihood(&data, 1.5).unwrap(), 0.5 * (l0 + l1), max_relative = 1e-12);
    }

    #[test]
    fn test_pin_and_reset() {
        let mut s = two_point_swarm();
        let data = [4.0, 3.0];
        let l1 = s.get(1).unwrap().likelihood(&data, 0.7).unwrap();
        s.pin(1).unwrap();
        assert_eq!(s.pinned(), Some(1));
        assert_relative_eq!(s.likelihood(&data, 0.7).unwrap(), l1, max_relative = 1e-12);
        // Pinned generation always uses the pinned point.
        let mut rng = StdRng::seed_from_u64(1);
        let expected = s.get(1).unwrap().generate(0.7, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(s.generate(0.7, &mut StdRng::seed_from_u64(9)).unwrap(), expected);
        assert!(s.generate(0.7, &mut rng).is_ok());
        s.reset();
        assert_eq!(s.pinned(), None);
        assert!(matches!(s.pin(2), Err(Error::IndexOutOfRange { index: 2, len: 2 })));
    }

    #[test]
    fn test_generate_draws_every_point() {
        // Two single-bin points with disjoint supports: zero and a huge mean.
        let mut s = MultiPoisson::new();
        s.add_point(vec![0.0], vec![0.0]).unwrap();
        s.add_point(vec![0.0], vec![1000.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen = [false; 2];
        for _ in 0..200 {
            let n = s.generate(1.0, &mut rng).unwrap()[0];
            seen[usize::from(n > 0.0)] = true;
        }
        assert_eq!(seen, [true, true]);
    }

    #[test]
    fn test_empty_and_mismatched() {
        let s = MultiPoisson::new();
        assert!(matches!(s.likelihood(&[1.0], 1.0), Err(Error::EmptySwarm(_))));
        assert!(s.generate(1.0, &mut StdRng::seed_from_u64(0)).is_err());
        let mut s = two_point_swarm();
        assert!(matches!(s.add_point(vec![1.0], vec![1.0]), Err(Error::BinMismatch { .. })));
        assert!(s.likelihood(&[1.0], 1.0).is_err());
    }

    #[test]
    fn test_update_and_means() {
        let mut s = two_point_swarm();
        s.update(0, vec![5.0, 5.0]).unwrap();
        assert_eq!(s.get(0).unwrap().signal(), &[5.0, 5.0]);
        assert!(s.update(7, vec![1.0, 1.0]).is_err());
        let (sig, bkg) = s.means().unwrap();
        assert_eq!(sig, vec![3.5, 3.0]);
        assert_eq!(bkg, vec![2.0, 1.5]);
        let d = s.generate_using_means(1.0, &mut StdRng::seed_from_u64(5)).unwrap();
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_profile_flag_is_stored_and_ignored() {
        let mut s = two_point_swarm();
        let before = s.likelihood(&[2.0, 2.0], 1.0).unwrap();
        s.set_profile(true);
        assert!(s.profile());
        assert_eq!(s.likelihood(&[2.0, 2.0], 1.0).unwrap(), before);
    }

    #[test]
    fn test_swarm_point_from_estimates() {
        let p = SwarmPoint::from_estimates(&[10.0], &[2.0], &[4.0], &[1.0]).unwrap();
        let g = GammaConstants::from_estimate(10.0, 2.0);
        assert_relative_eq!(p.signal_counts[0], g.shape - 1.0);
        assert_relative_eq!(p.signal_scales[0], 1.0 / g.scale);
        assert!(SwarmPoint::from_estimates(&[10.0], &[2.0, 1.0], &[4.0], &[1.0]).is_err());

        let json = serde_json::to_string(&p).unwrap();
        let back: SwarmPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_poisson_gamma_swarm_update() {
        let point = SwarmPoint::from_counts(vec![3.0], vec![2.0], vec![1.0], vec![1.0]);
        let mut s = MultiPoissonGamma::new();
        s.add_point(&point).unwrap();
        s.update(0, vec![6.0]).unwrap();
        assert_eq!(s.get(0).unwrap().signal_counts(), &[6.0]);
        assert_eq!(s.get(0).unwrap().signal_scales(), &[2.0]);
    }

    #[test]
    fn test_sample_poisson_swarm_moments() {
        let mut rng = StdRng::seed_from_u64(11);
        let s = sample_poisson_swarm(&[10.0], &[2.0], &[4.0], &[1.0], 4000, &mut rng).unwrap();
        assert_eq!(s.len(), 4000);
        let (sig, bkg) = s.means().unwrap();
        // Gamma mean is γβ, slightly above the mode.
        let g = GammaConstants::from_estimate(10.0, 2.0);
        assert!((sig[0] - g.mean()).abs() < 0.15, "{}", sig[0]);
        let g = GammaConstants::from_estimate(4.0, 1.0);
        assert!((bkg[0] - g.mean()).abs() < 0.08, "{}", bkg[0]);
        assert!(sample_poisson_swarm(&[1.0], &[1.0], &[1.0], &[1.0], 0, &mut rng).is_err());
    }
}
