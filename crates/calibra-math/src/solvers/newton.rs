//! Newton-type root finder for vector fields.

use std::fmt;

use log::{debug, warn};

use crate::error::{MathError, MathResult};
use crate::jacobian::{
    broyden_update, evaluate_jacobian, initialize_jacobian, newton_direction,
    sherman_morrison_update, JacobianUpdate,
};
use crate::linear_algebra::{Decomposition, Matrix, MatrixAlgebra, Vector};
use crate::solvers::line_search::merit_of;
use crate::solvers::{RootFinderResult, SolverConfig, VectorRootFinder};

/// Progress of a single root search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewtonStatus {
    /// Start point evaluated and Jacobian estimate seeded.
    Initialized,
    /// At least one direction has been computed.
    Iterating,
    /// `‖f(x)‖` fell below the tolerance.
    Converged,
}

impl fmt::Display for NewtonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialized => "initialized",
            Self::Iterating => "iterating",
            Self::Converged => "converged",
        };
        f.write_str(s)
    }
}

/// Per-call iteration state. Dropped when `find_root` returns.
struct ConvergenceState {
    status: NewtonStatus,
    iteration: u32,
    x: Vector,
    residual: Vector,
    merit: f64,
    /// The Jacobian estimate, or its inverse for Sherman-Morrison updates.
    estimate: Matrix,
    /// Whether `estimate` came from a true Jacobian at `x`.
    fresh: bool,
}

/// Newton root finder with a backtracking line search and pluggable
/// Jacobian updates.
///
/// When the line search cannot find an acceptable point, `x` is left
/// unchanged. A quasi-Newton estimate is then replaced by the true Jacobian
/// at `x` for the next iteration. Every iteration counts against
/// `max_iterations`, so the search always terminates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewtonVectorRootFinder {
    config: SolverConfig,
}

impl NewtonVectorRootFinder {
    /// Creates a root finder with the given configuration.
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Newton's method with the Jacobian re-evaluated at every iterate.
    #[must_use]
    pub fn full_newton() -> Self {
        Self::new(SolverConfig::default().with_update(JacobianUpdate::Full))
    }

    /// Broyden's method.
    #[must_use]
    pub fn broyden() -> Self {
        Self::new(SolverConfig::default().with_update(JacobianUpdate::Broyden))
    }

    /// Broyden's method on the inverse Jacobian.
    #[must_use]
    pub fn sherman_morrison() -> Self {
        Self::new(SolverConfig::default().with_update(JacobianUpdate::ShermanMorrison))
    }

    /// Replaces the configuration, keeping the update strategy.
    #[must_use]
    pub fn with_config(self, config: SolverConfig) -> Self {
        Self::new(config.with_update(self.config.update))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Finds a root using finite-difference derivatives.
    pub fn find_root_numerical<F>(&self, function: F, x0: &Vector) -> MathResult<RootFinderResult>
    where
        F: Fn(&Vector) -> Vector,
    {
        self.find_root(function, None::<fn(&Vector) -> Matrix>, x0)
    }

    /// Turns a true Jacobian into the estimate the update strategy works on.
    fn seed(
        &self,
        jacobian: Matrix,
        decomposition: &dyn Decomposition,
        iteration: u32,
        x: &Vector,
    ) -> MathResult<Matrix> {
        match self.config.update {
            JacobianUpdate::ShermanMorrison => decomposition
                .decompose(&jacobian)
                .and_then(|d| d.inverse())
                .map_err(|e| singular_jacobian(e, iteration, x)),
            JacobianUpdate::Full | JacobianUpdate::Broyden => Ok(jacobian),
        }
    }

    /// Search direction and the merit slope along it.
    fn direction(
        &self,
        state: &ConvergenceState,
        algebra: &dyn MatrixAlgebra,
        decomposition: &dyn Decomposition,
    ) -> MathResult<(Vector, f64)> {
        let completed = state.iteration - 1;
        match self.config.update {
            JacobianUpdate::ShermanMorrison => {
                let step = algebra.multiply_vector(&state.estimate, &state.residual)?;
                // Exact for H = J⁻¹: rᵀ·J·(−H·r) = −‖r‖².
                Ok((step.map(|v| -v), -2.0 * state.merit))
            }
            JacobianUpdate::Full | JacobianUpdate::Broyden => {
                let direction = newton_direction(decomposition, &state.estimate, &state.residual)
                    .map_err(|e| singular_jacobian(e, completed, &state.x))?;
                let predicted = algebra.multiply_vector(&state.estimate, &direction)?;
                let slope = algebra.inner_product(&state.residual, &predicted)?;
                Ok((direction, slope))
            }
        }
    }
}

impl VectorRootFinder for NewtonVectorRootFinder {
    fn find_root<F, J>(
        &self,
        function: F,
        jacobian: Option<J>,
        x0: &Vector,
    ) -> MathResult<RootFinderResult>
    where
        F: Fn(&Vector) -> Vector,
        J: Fn(&Vector) -> Matrix,
    {
        let config = &self.config;
        config.validate()?;

        if x0.is_empty() {
            return Err(MathError::invalid_input("starting point is empty"));
        }
        if !x0.is_finite() {
            return Err(MathError::invalid_input("starting point contains non-finite values"));
        }

        let algebra = config.backend.algebra();
        let decomposition = config.decomposition.decomposition();
        let jacobian = jacobian.as_ref();

        let fx0 = function(x0);
        if fx0.is_empty() || !fx0.is_finite() {
            return Err(MathError::invalid_input(
                "function value at the starting point must be non-empty and finite",
            ));
        }
        if config.update == JacobianUpdate::ShermanMorrison && fx0.len() != x0.len() {
            return Err(MathError::invalid_input(format!(
                "Sherman-Morrison updates need a square system, got {} equations in {} unknowns",
                fx0.len(),
                x0.len()
            )));
        }

        let merit = merit_of(algebra, &fx0);
        let mut merit_history = vec![merit];
        let norm = algebra.norm2(&fx0);
        if norm < config.tolerance {
            debug!("{}: start point is already a root (|f| = {:.3e})", self.name(), norm);
            return Ok(RootFinderResult {
                root: x0.clone(),
                residual: fx0,
                residual_norm: norm,
                iterations: 0,
                merit_history,
            });
        }

        let initial = initialize_jacobian(&function, jacobian, x0, &fx0, &config.finite_difference)?;
        let mut state = ConvergenceState {
            status: NewtonStatus::Initialized,
            iteration: 0,
            x: x0.clone(),
            residual: fx0,
            merit,
            estimate: self.seed(initial, decomposition, 0, x0)?,
            fresh: true,
        };
        debug!(
            "{} ({}, {}): {}, |f| = {:.3e}",
            self.name(),
            decomposition.name(),
            algebra.name(),
            state.status,
            norm
        );

        while state.iteration < config.max_iterations {
            state.iteration += 1;
            state.status = NewtonStatus::Iterating;

            let (direction, slope) = self.direction(&state, algebra, decomposition)?;
            let Some(step) = config.line_search.search(
                &function,
                algebra,
                &state.x,
                &direction,
                state.merit,
                slope,
            )?
            else {
                if state.fresh {
                    // Nothing changes before the next iteration, so it would fail the same way.
                    debug!(
                        "iteration {}: line search exhausted along a fresh Jacobian, stopping",
                        state.iteration
                    );
                    break;
                }
                debug!(
                    "iteration {}: line search exhausted, re-seeding the Jacobian estimate",
                    state.iteration
                );
                let true_jacobian = evaluate_jacobian(
                    &function,
                    jacobian,
                    &state.x,
                    &state.residual,
                    &config.finite_difference,
                )?;
                state.estimate = self.seed(true_jacobian, decomposition, state.iteration, &state.x)?;
                state.fresh = true;
                continue;
            };

            if step.value.len() != state.residual.len() {
                return Err(MathError::dimension_mismatch(
                    (state.residual.len(), 1),
                    (step.value.len(), 1),
                ));
            }

            let delta_x = algebra.subtract_vectors(&step.point, &state.x)?;
            let delta_y = algebra.subtract_vectors(&step.value, &state.residual)?;
            state.x = step.point;
            state.residual = step.value;
            state.merit = step.merit;
            merit_history.push(state.merit);

            let norm = algebra.norm2(&state.residual);
            debug!(
                "iteration {}: |f| = {:.3e}, alpha = {:.3e}",
                state.iteration, norm, step.alpha
            );

            if norm < config.tolerance {
                state.status = NewtonStatus::Converged;
                debug!(
                    "{}: {} after {} iterations",
                    self.name(),
                    state.status,
                    state.iteration
                );
                return Ok(RootFinderResult {
                    root: state.x,
                    residual: state.residual,
                    residual_norm: norm,
                    iterations: state.iteration,
                    merit_history,
                });
            }

            state.estimate = match config.update {
                JacobianUpdate::Full => evaluate_jacobian(
                    &function,
                    jacobian,
                    &state.x,
                    &state.residual,
                    &config.finite_difference,
                )?,
                JacobianUpdate::Broyden => {
                    broyden_update(algebra, &delta_x, &delta_y, state.estimate)?
                }
                JacobianUpdate::ShermanMorrison => {
                    sherman_morrison_update(algebra, &delta_x, &delta_y, state.estimate)?
                }
            };
            state.fresh = config.update == JacobianUpdate::Full;
        }

        let norm = algebra.norm2(&state.residual);
        warn!(
            "{}: no root after {} iterations (|f| = {:.3e})",
            self.name(),
            state.iteration,
            norm
        );
        Err(MathError::max_iterations(
            state.iteration,
            norm,
            state.x.into_vec(),
        ))
    }

    fn name(&self) -> &'static str {
        self.config.update.name()
    }
}

fn singular_jacobian(error: MathError, iterations: u32, x: &Vector) -> MathError {
    match error {
        MathError::SingularMatrix => {
            warn!("singular Jacobian after {} iterations", iterations);
            MathError::SingularJacobian {
                iterations,
                last_iterate: x.as_slice().to_vec(),
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_algebra::{AlgebraBackend, DecompositionMethod};
    use approx::assert_relative_eq;
    use std::cell::Cell;

    const UPDATES: [JacobianUpdate; 3] = [
        JacobianUpdate::Full,
        JacobianUpdate::Broyden,
        JacobianUpdate::ShermanMorrison,
    ];

    fn finder(update: JacobianUpdate) -> NewtonVectorRootFinder {
        NewtonVectorRootFinder::new(SolverConfig::default().with_update(update))
    }

    /// Rosenbrock's system: 10(y − x²) = 0, 1 − x = 0.
    fn rosenbrock(x: &Vector) -> Vector {
        Vector::new(vec![10.0 * (x[1] - x[0] * x[0]), 1.0 - x[0]])
    }

    fn rosenbrock_jacobian(x: &Vector) -> Matrix {
        Matrix::from_row_slice(2, 2, &[-20.0 * x[0], 10.0, -1.0, 0.0]).unwrap()
    }

    #[test]
    fn test_rosenbrock_all_updates() {
        let x0 = Vector::new(vec![-1.2, 1.0]);
        for update in UPDATES {
            let analytic = finder(update)
                .find_root(rosenbrock, Some(rosenbrock_jacobian), &x0)
                .unwrap();
            assert_relative_eq!(analytic.root[0], 1.0, epsilon = 1e-8);
            assert_relative_eq!(analytic.root[1], 1.0, epsilon = 1e-8);
            assert!(analytic.residual_norm < 1e-8);

            let numerical = finder(update).find_root_numerical(rosenbrock, &x0).unwrap();
            assert_relative_eq!(numerical.root[0], 1.0, epsilon = 1e-8);
            assert_relative_eq!(numerical.root[1], 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_merit_is_non_increasing() {
        let x0 = Vector::new(vec![-1.2, 1.0]);
        for update in UPDATES {
            let result = finder(update)
                .find_root(rosenbrock, Some(rosenbrock_jacobian), &x0)
                .unwrap();
            assert_eq!(result.merit_history.len() as u32, result.iterations + 1);
            for pair in result.merit_history.windows(2) {
                assert!(pair[1] <= pair[0]);
            }
        }
    }

    #[test]
    fn test_merit_is_non_increasing_on_convex_quadratic() {
        // f(x) = A·x − b with A symmetric positive definite.
        let a = Matrix::from_row_slice(3, 3, &[4.0, 1.0, 0.0, 1.0, 3.0, 0.5, 0.0, 0.5, 2.0]).unwrap();
        let f = |x: &Vector| {
            Vector::new(vec![
                4.0 * x[0] + x[1] - 1.0,
                x[0] + 3.0 * x[1] + 0.5 * x[2] - 2.0,
                0.5 * x[1] + 2.0 * x[2] - 3.0,
            ])
        };
        // diag(A) alone needs several damped iterations.
        let diagonal = Matrix::diagonal(&Vector::new(vec![4.0, 3.0, 2.0]));
        let x0 = Vector::new(vec![10.0, -10.0, 5.0]);
        let expected = [13.0 / 84.0, 8.0 / 21.0, 59.0 / 42.0];

        for update in UPDATES {
            for estimate in [&a, &diagonal] {
                let result = finder(update)
                    .find_root(f, Some(|_: &Vector| estimate.clone()), &x0)
                    .unwrap();
                assert_eq!(result.merit_history.len() as u32, result.iterations + 1);
                for pair in result.merit_history.windows(2) {
                    assert!(pair[1] <= pair[0], "{update:?}: {} > {}", pair[1], pair[0]);
                }
                for (value, expected) in result.root.iter().zip(expected) {
                    assert_relative_eq!(*value, expected, epsilon = 1e-7);
                }
            }
        }
    }

    #[test]
    fn test_transcendental_system() {
        // x² + y² = 4, eˣ + y = 1
        let f = |x: &Vector| {
            Vector::new(vec![x[0] * x[0] + x[1] * x[1] - 4.0, x[0].exp() + x[1] - 1.0])
        };
        let x0 = Vector::new(vec![1.0, -1.0]);

        for update in UPDATES {
            let result = finder(update).find_root_numerical(f, &x0).unwrap();
            let value = f(&result.root);
            assert!(value[0].abs() < 1e-8);
            assert!(value[1].abs() < 1e-8);
            assert_relative_eq!(result.root[0], 1.004_168_738, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_no_real_root_stops_once_fresh_search_fails() {
        // x² + 1 has no real root; the merit bottoms out at x = 0 where the
        // Newton step blows up and every backtrack is rejected.
        let df = |x: &Vector| Matrix::from_row_slice(1, 1, &[2.0 * x[0]]).unwrap();

        for start in [2.0, 0.5, -3.0, 1e-3, 10.0] {
            for update in UPDATES {
                let evaluations = Cell::new(0_u32);
                let f = |x: &Vector| {
                    evaluations.set(evaluations.get() + 1);
                    Vector::new(vec![x[0] * x[0] + 1.0])
                };
                let config = SolverConfig::default()
                    .with_update(update)
                    .with_max_iterations(50);
                let result = NewtonVectorRootFinder::new(config).find_root(
                    f,
                    Some(df),
                    &Vector::new(vec![start]),
                );

                match result {
                    Err(MathError::MaxIterationsExceeded {
                        iterations,
                        residual,
                        last_iterate,
                    }) => {
                        assert!(iterations < 50, "{update:?} from {start}: {iterations}");
                        assert!(residual >= 1.0);
                        assert!(last_iterate[0].abs() < 1e-3);
                    }
                    other => panic!("expected MaxIterationsExceeded, got {other:?}"),
                }
                assert!(
                    evaluations.get() < 700,
                    "{update:?} from {start}: {} evaluations",
                    evaluations.get()
                );
            }
        }
    }

    #[test]
    fn test_max_iterations_is_a_hard_cap() {
        // The first two steps from x = 2 are accepted, so the cap is what stops it.
        let f = |x: &Vector| Vector::new(vec![x[0] * x[0] + 1.0]);
        let config = SolverConfig::default()
            .with_update(JacobianUpdate::Full)
            .with_max_iterations(2);
        let result = NewtonVectorRootFinder::new(config).find_root_numerical(f, &Vector::new(vec![2.0]));
        assert!(matches!(
            result,
            Err(MathError::MaxIterationsExceeded { iterations: 2, .. })
        ));
    }

    #[test]
    fn test_already_at_root() {
        let evaluations = Cell::new(0);
        let jacobian = |_: &Vector| {
            evaluations.set(evaluations.get() + 1);
            Matrix::identity(2)
        };
        let result = NewtonVectorRootFinder::default()
            .find_root(|x: &Vector| x.clone(), Some(jacobian), &Vector::zeros(2))
            .unwrap();

        assert_eq!(result.iterations, 0);
        assert_eq!(evaluations.get(), 0);
    }

    #[test]
    fn test_linear_system_one_newton_step() {
        let a = Matrix::from_row_slice(2, 2, &[3.0, 1.0, 1.0, 2.0]).unwrap();
        let f = |x: &Vector| {
            Vector::new(vec![
                3.0 * x[0] + x[1] - 9.0,
                x[0] + 2.0 * x[1] - 8.0,
            ])
        };
        let result = NewtonVectorRootFinder::full_newton()
            .find_root(f, Some(|_: &Vector| a.clone()), &Vector::zeros(2))
            .unwrap();

        assert_eq!(result.iterations, 1);
        assert_relative_eq!(result.root[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(result.root[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_jacobian_mid_iteration() {
        // The Jacobian vanishes once x₀ passes 1.5; the first step lands at 2.5.
        let f = |x: &Vector| Vector::new(vec![x[0] - 2.0, x[1] - 2.0]);
        let df = |x: &Vector| {
            if x[0] > 1.5 {
                Matrix::zeros(2, 2)
            } else {
                Matrix::diagonal(&Vector::filled(2, 0.8))
            }
        };
        let result = NewtonVectorRootFinder::full_newton().find_root(f, Some(df), &Vector::zeros(2));

        match result {
            Err(MathError::SingularJacobian {
                iterations,
                last_iterate,
            }) => {
                assert_eq!(iterations, 1);
                assert_relative_eq!(last_iterate[0], 2.5, epsilon = 1e-12);
            }
            other => panic!("expected SingularJacobian, got {other:?}"),
        }
    }

    #[test]
    fn test_degenerate_start() {
        let f = |x: &Vector| Vector::new(vec![x[0] * x[0] - 1.0]);
        let result = NewtonVectorRootFinder::full_newton().find_root_numerical(f, &Vector::zeros(1));
        assert!(matches!(result, Err(MathError::DegenerateJacobian { .. })));
    }

    #[test]
    fn test_invalid_inputs() {
        let f = |x: &Vector| x.clone();
        let finder = NewtonVectorRootFinder::default();
        assert!(matches!(
            finder.find_root_numerical(f, &Vector::zeros(0)),
            Err(MathError::InvalidInput { .. })
        ));
        assert!(matches!(
            finder.find_root_numerical(f, &Vector::new(vec![f64::NAN])),
            Err(MathError::InvalidInput { .. })
        ));

        let wide = |x: &Vector| Vector::new(vec![x[0] + x[1]]);
        assert!(matches!(
            NewtonVectorRootFinder::sherman_morrison().find_root_numerical(wide, &Vector::zeros(2)),
            Err(MathError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_overdetermined_consistent_system() {
        // Three equations, two unknowns, consistent at (1, 2).
        let f = |x: &Vector| {
            Vector::new(vec![x[0] - 1.0, x[1] - 2.0, x[0] * x[1] - 2.0])
        };
        let config = SolverConfig::default()
            .with_update(JacobianUpdate::Full)
            .with_decomposition(DecompositionMethod::Svd);
        let result = NewtonVectorRootFinder::new(config)
            .find_root_numerical(f, &Vector::new(vec![0.5, 0.5]))
            .unwrap();
        assert_relative_eq!(result.root[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(result.root[1], 2.0, epsilon = 1e-8);
    }

    #[test]
    fn test_backends_agree() {
        let x0 = Vector::new(vec![-1.2, 1.0]);
        let roots: Vec<Vector> = [AlgebraBackend::Naive, AlgebraBackend::Nalgebra]
            .into_iter()
            .map(|backend| {
                NewtonVectorRootFinder::broyden()
                    .with_config(SolverConfig::default().with_backend(backend))
                    .find_root(rosenbrock, Some(rosenbrock_jacobian), &x0)
                    .unwrap()
                    .root
            })
            .collect();
        assert_relative_eq!(roots[0][0], roots[1][0], epsilon = 1e-8);
        assert_relative_eq!(roots[0][1], roots[1][1], epsilon = 1e-8);
    }
}
