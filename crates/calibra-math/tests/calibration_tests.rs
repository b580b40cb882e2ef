//! End-to-end calibration workflows through the public prelude.

use approx::assert_relative_eq;
use calibra_math::prelude::*;

// =============================================================================
// TEST DATA
// =============================================================================

const MATURITIES: [f64; 9] = [0.5, 1.0, 2.0, 3.0, 5.0, 7.0, 10.0, 20.0, 30.0];

fn nelson_siegel(params: &Vector, t: f64) -> f64 {
    let (b0, b1, b2, tau) = (params[0], params[1], params[2], params[3]);
    let x = t / tau;
    let decay = (-x).exp();
    let loading = (1.0 - decay) / x;
    b0 + b1 * loading + b2 * (loading - decay)
}

fn nelson_siegel_curve(params: &Vector) -> Vector {
    MATURITIES.iter().map(|&t| nelson_siegel(params, t)).collect()
}

/// Annual par swap rates for one, two and three years.
const PAR_RATES: [f64; 3] = [0.03, 0.035, 0.04];

/// Pricing error of each par swap under continuously compounded zero rates.
fn par_swap_errors(zero_rates: &Vector) -> Vector {
    let discount: Vec<f64> = (0..3)
        .map(|k| (-zero_rates[k] * (k + 1) as f64).exp())
        .collect();
    (0..3)
        .map(|n| {
            let annuity: f64 = discount[..=n].iter().sum();
            1.0 - discount[n] - PAR_RATES[n] * annuity
        })
        .collect()
}

/// Sequential bootstrap of the same curve.
fn bootstrapped_zero_rates() -> Vec<f64> {
    let mut discount: Vec<f64> = Vec::new();
    for rate in PAR_RATES {
        let annuity: f64 = discount.iter().sum();
        discount.push((1.0 - rate * annuity) / (1.0 + rate));
    }
    discount
        .iter()
        .enumerate()
        .map(|(k, d)| -d.ln() / (k + 1) as f64)
        .collect()
}

// =============================================================================
// CURVE FITTING
// =============================================================================

#[test]
fn test_nelson_siegel_fit_recovers_parameters() {
    let truth = Vector::new(vec![0.04, -0.02, 0.01, 2.0]);
    let observed = nelson_siegel_curve(&truth);
    let sigma = Vector::filled(MATURITIES.len(), 1e-4);
    let fitter = NonLinearLeastSquares::new(LeastSquaresConfig::default());

    for start in [vec![0.03, -0.01, 0.0, 1.5], vec![0.03, -0.03, 0.02, 3.0]] {
        let result = fitter
            .solve_constrained(
                &observed,
                &sigma,
                nelson_siegel_curve,
                None::<fn(&Vector) -> Matrix>,
                &Vector::new(start),
                |p: &Vector| p[3] > 0.0,
            )
            .unwrap();

        for k in 0..4 {
            assert_relative_eq!(result.parameters[k], truth[k], epsilon = 1e-6);
        }
        assert!(result.chi_squared < 1e-12);
        assert_eq!(result.degrees_of_freedom(), 5);
        assert!(result
            .chi_squared_history
            .windows(2)
            .all(|pair| pair[1] < pair[0]));
    }
}

#[test]
fn test_linear_fitters_agree() {
    let x: Vec<f64> = (0..12).map(|i| i as f64 / 6.0).collect();
    let y: Vector = x
        .iter()
        .map(|&t| 0.5 - 1.5 * t + 0.75 * t * t + 0.05 * (7.0 * t).sin())
        .collect();
    let sigma: Vector = x.iter().map(|&t| 0.1 + 0.05 * t).collect();
    let abscissae = Vector::from_slice(&x);

    let linear = GeneralizedLeastSquares::new()
        .solve(&abscissae, &y, &sigma, &polynomial_basis(2))
        .unwrap();

    let model = |p: &Vector| -> Vector {
        x.iter()
            .map(|&t| p[0] + p[1] * t + p[2] * t * t)
            .collect()
    };
    let jacobian = |_: &Vector| Matrix::from_fn(x.len(), 3, |i, j| x[i].powi(j as i32));
    let nonlinear = NonLinearLeastSquares::new(LeastSquaresConfig::default())
        .solve(
            &y,
            &sigma,
            model,
            Some(jacobian),
            &Vector::zeros(3),
            None::<fn(&Vector) -> bool>,
        )
        .unwrap();

    for k in 0..3 {
        assert_relative_eq!(nonlinear.parameters[k], linear.parameters[k], epsilon = 1e-8);
        for j in 0..3 {
            assert_relative_eq!(
                nonlinear.covariance[(k, j)],
                linear.covariance[(k, j)],
                epsilon = 1e-8,
                max_relative = 1e-8
            );
        }
    }
    assert_relative_eq!(nonlinear.chi_squared, linear.chi_squared, epsilon = 1e-8);
}

// =============================================================================
// ROOT FINDING
// =============================================================================

#[test]
fn test_par_curve_bootstrap_matches_sequential_solution() {
    let expected = bootstrapped_zero_rates();
    let x0 = Vector::filled(3, 0.03);

    for finder in [
        NewtonVectorRootFinder::full_newton(),
        NewtonVectorRootFinder::broyden(),
        NewtonVectorRootFinder::sherman_morrison(),
    ] {
        let result = finder.find_root_numerical(par_swap_errors, &x0).unwrap();
        assert!(result.residual_norm < 1e-8, "{}", finder.name());
        for k in 0..3 {
            assert_relative_eq!(result.root[k], expected[k], epsilon = 1e-7);
        }
    }
}

#[test]
fn test_bootstrap_with_every_decomposition() {
    let expected = bootstrapped_zero_rates();
    for method in [DecompositionMethod::Lu, DecompositionMethod::Svd, DecompositionMethod::Qr] {
        let config = SolverConfig::default()
            .with_decomposition(method)
            .with_update(JacobianUpdate::Full);
        let result = NewtonVectorRootFinder::new(config)
            .find_root_numerical(par_swap_errors, &Vector::filled(3, 0.0))
            .unwrap();
        for k in 0..3 {
            assert_relative_eq!(result.root[k], expected[k], epsilon = 1e-7);
        }
    }
}
