//! One-dimensional quadrature: adaptive Gauss-Legendre and cumulative Simpson.

use sl_core::{Error, Result};

/// Configuration for adaptive Gauss-Legendre integration
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureConfig {
    /// Nodes per panel
    pub order: usize,
    /// Relative tolerance
    pub rel_tol: f64,
    /// Absolute tolerance
    pub abs_tol: f64,
    /// Maximum bisection depth
    pub max_depth: usize,
}

impl Default for QuadratureConfig {
    fn default() -> Self {
        Self { order: 16, rel_tol: 1e-9, abs_tol: 1e-12, max_depth: 20 }
    }
}

/// Compute Gauss-Legendre nodes and weights on `[-1, 1]` for the given order.
///
/// Uses Newton iteration to find roots of the Legendre polynomial P_n(x),
/// then computes weights from the derivative P'_n at each root.
/// Exploits symmetry: only computes half the roots.
pub fn gauss_legendre_nodes_weights(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0f64; n];
    let mut weights = vec![0.0f64; n];

    if n == 0 {
        return (nodes, weights);
    }
    if n == 1 {
        weights[0] = 2.0;
        return (nodes, weights);
    }

    let nf = n as f64;
    let legendre = |x: f64| {
        // (P_n(x), P_{n-1}(x)) via the three-term recurrence.
        let mut p0 = 1.0f64;
        let mut p1 = x;
        for j in 2..=n {
            let jf = j as f64;
            let p2 = ((2.0 * jf - 1.0) * x * p1 - (jf - 1.0) * p0) / jf;
            p0 = p1;
            p1 = p2;
        }
        (p1, p0)
    };

    for i in 0..n.div_ceil(2) {
        // Chebyshev initial guess.
        let mut x = ((std::f64::consts::PI * (i as f64 + 0.75)) / (nf + 0.5)).cos();
        for _ in 0..100 {
            let (pn, pn1) = legendre(x);
            let dp = nf * (x * pn - pn1) / (x * x - 1.0);
            let dx = pn / dp;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (pn, pn1) = legendre(x);
        let dp = nf * (x * pn - pn1) / (x * x - 1.0);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        nodes[i] = -x;
        nodes[n - 1 - i] = x;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }

    (nodes, weights)
}

/// Adaptive Gauss-Legendre integrator with precomputed nodes.
#[derive(Debug, Clone)]
pub struct Integrator {
    nodes: Vec<f64>,
    weights: Vec<f64>,
    config: QuadratureConfig,
}

impl Integrator {
    /// Create an integrator; `order` must be at least 2.
    pub fn new(config: QuadratureConfig) -> Result<Self> {
        if config.order < 2 {
            return Err(Error::Validation(format!(
                "quadrature order must be >= 2, got {}",
                config.order
            )));
        }
        let (nodes, weights) = gauss_legendre_nodes_weights(config.order);
        Ok(Self { nodes, weights, config })
    }

    fn panel(&self, f: &dyn Fn(f64) -> Result<f64>, a: f64, b: f64) -> Result<f64> {
        let half_len = 0.5 * (b - a);
        let mid = 0.5 * (a + b);
        let mut acc = 0.0;
        for (&x, &w) in self.nodes.iter().zip(&self.weights) {
            acc += w * f(mid + half_len * x)?;
        }
        Ok(acc * half_len)
    }

    /// `∫_a^b f(x) dx`. Returns 0 for an empty interval and `-∫_b^a` when `b < a`.
    pub fn integrate(&self, f: &dyn Fn(f64) -> Result<f64>, a: f64, b: f64) -> Result<f64> {
        if !(a.is_finite() && b.is_finite()) {
            return Err(Error::Validation(format!("cannot integrate over [{}, {}]", a, b)));
        }
        if a == b {
            return Ok(0.0);
        }
        if b < a {
            return Ok(-self.integrate(f, b, a)?);
        }
        let whole = self.panel(f, a, b)?;
        self.refine(f, a, b, whole, 0)
    }

    fn refine(
        &self,
        f: &dyn Fn(f64) -> Result<f64>,
        a: f64,
        b: f64,
        whole: f64,
        depth: usize,
    ) -> Result<f64> {
        let mid = 0.5 * (a + b);
        let left = self.panel(f, a, mid)?;
        let right = self.panel(f, mid, b)?;
        let sum = left + right;
        if !sum.is_finite() {
            return Err(Error::Computation(format!(
                "non-finite integrand on [{}, {}]",
                a, b
            )));
        }
        let tol = self.config.abs_tol.max(self.config.rel_tol * sum.abs());
        if (sum - whole).abs() <= tol {
            return Ok(sum);
        }
        if depth >= self.config.max_depth {
            log::debug!(
                "quadrature: depth limit on [{}, {}], error estimate {:.3e}",
                a,
                b,
                (sum - whole).abs()
            );
            return Ok(sum);
        }
        Ok(self.refine(f, a, mid, left, depth + 1)? + self.refine(f, mid, b, right, depth + 1)?)
    }
}

/// Cumulative composite Simpson integral of equally spaced samples.
///
/// `ys` holds `2m + 1` samples spaced by `h`; the result has `m + 1` entries,
/// the integral from the first sample up to every even-indexed sample.
pub fn simpson_cumulative(ys: &[f64], h: f64) -> Result<Vec<f64>> {
    if ys.len() < 3 || ys.len() % 2 == 0 {
        return Err(Error::Validation(format!(
            "Simpson's rule needs an odd number (>= 3) of samples, got {}",
            ys.len()
        )));
    }
    let scale = 2.0 * h / 6.0;
    let mut out = Vec::with_capacity(ys.len() / 2 + 1);
    out.push(0.0);
    let mut acc = 0.0;
    for pair in (1..ys.len()).step_by(2) {
        acc += scale * (ys[pair - 1] + 4.0 * ys[pair] + ys[pair + 1]);
        out.push(acc);
    }
    Ok(out)
}
