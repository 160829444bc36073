//! Cross-checks of the closed-form Poisson-Gamma likelihood.

use approx::assert_relative_eq;
use sl_core::ProbabilityModel;
use sl_model::{MultiPoissonGamma, PoissonGammaModel, PoissonPoint, SwarmModel, SwarmPoint};
use statrs::function::gamma::ln_gamma;

fn ln_poisson(n: f64, mean: f64) -> f64 {
    n * mean.ln() - mean - ln_gamma(n + 1.0)
}

fn gamma_density(t: f64, shape: f64, rate: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    (shape * rate.ln() - ln_gamma(shape) + (shape - 1.0) * t.ln() - rate * t).exp()
}

/// Composite Simpson rule over `[0, upper]^2` of
/// `Poisson(n | poi*eps + mu) * Gamma(eps; x+1/2, a) * Gamma(mu; y+1/2, b)`.
fn brute_force_bin(n: f64, x: f64, a: f64, y: f64, b: f64, poi: f64, upper: f64) -> f64 {
    let m = 1200;
    let h = upper / m as f64;
    let w = |i: usize| -> f64 {
        if i == 0 || i == m {
            1.0
        } else if i % 2 == 1 {
            4.0
        } else {
            2.0
        }
    };
    let mut total = 0.0;
    for i in 0..=m {
        let eps = i as f64 * h;
        let ge = gamma_density(eps, x + 0.5, a);
        if ge == 0.0 {
            continue;
        }
        for j in 0..=m {
            let mu = j as f64 * h;
            let gm = gamma_density(mu, y + 0.5, b);
            if gm == 0.0 {
                continue;
            }
            let mean = poi * eps + mu;
            total += w(i) * w(j) * ge * gm * ln_poisson(n, mean).exp();
        }
    }
    total * h * h / 9.0
}

#[test]
fn two_bins_match_brute_force_double_integration() {
    let model =
        PoissonGammaModel::new(vec![10.0, 10.0], vec![1.0, 1.0], vec![5.0, 5.0], vec![1.0, 1.0])
            .unwrap();
    let data = [12.0, 6.0];
    let closed = model.likelihood(&data, 1.0).unwrap();
    let brute = brute_force_bin(12.0, 10.0, 1.0, 5.0, 1.0, 1.0, 60.0)
        * brute_force_bin(6.0, 10.0, 1.0, 5.0, 1.0, 1.0, 60.0);
    assert_relative_eq!(closed, brute, max_relative = 1e-6);
}

#[test]
fn narrow_priors_converge_to_poisson_convolution() {
    // eps and mu concentrate at (x+1/2)/a and (y+1/2)/b as a, b grow.
    let (eps, mu, poi) = (2.0f64, 3.0f64, 1.5f64);
    let n = 7.0;
    let convolution: f64 = (0..=7)
        .map(|k| {
            let k = k as f64;
            (ln_poisson(k, poi * eps) + ln_poisson(n - k, mu)).exp()
        })
        .sum();

    let mut previous_err = f64::INFINITY;
    for &scale in &[1e2, 1e4, 1e6] {
        let x = eps * scale - 0.5;
        let y = mu * scale - 0.5;
        let model = PoissonGammaModel::new(vec![x], vec![scale], vec![y], vec![scale]).unwrap();
        let err = (model.likelihood(&[n], poi).unwrap() - convolution).abs() / convolution;
        assert!(err < previous_err, "scale {}: {} !< {}", scale, err, previous_err);
        previous_err = err;
    }
    assert!(previous_err < 1e-4, "relative error {}", previous_err);
}

#[test]
fn identical_swarm_points_average_to_one_point() {
    let point = SwarmPoint::from_estimates(&[10.0, 4.0], &[2.0, 1.0], &[5.0, 2.0], &[1.0, 0.5])
        .unwrap();
    let single = PoissonGammaModel::from_point(&point).unwrap();
    let mut swarm = MultiPoissonGamma::new();
    for _ in 0..100 {
        swarm.add_point(&point).unwrap();
    }
    for &poi in &[0.0, 0.5, 1.0, 3.0] {
        let data = [12.0, 6.0];
        assert_relative_eq!(
            swarm.likelihood(&data, poi).unwrap(),
            single.likelihood(&data, poi).unwrap(),
            max_relative = 1e-12
        );
    }

    let p = PoissonPoint::new(vec![1.0, 2.0], vec![3.0, 4.0]).unwrap();
    let swarm = SwarmModel::from_points(vec![p.clone(); 100]).unwrap();
    assert_relative_eq!(
        swarm.likelihood(&[4.0, 6.0], 1.2).unwrap(),
        p.likelihood(&[4.0, 6.0], 1.2).unwrap(),
        max_relative = 1e-12
    );
}
