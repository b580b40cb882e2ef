//! Levenberg-Marquardt non-linear least squares.

use log::{debug, trace, warn};

use crate::error::{MathError, MathResult};
use crate::jacobian::FiniteDifferenceConfig;
use crate::linear_algebra::{Decomposition, Matrix, MatrixAlgebra, Vector};
use crate::optimization::{
    validate_observations, LeastSquaresConfig, LeastSquaresResult, NoConstraint,
};

/// Weighted least-squares fitter.
///
/// Minimizes `χ²(p) = Σ ((yᵢ − fᵢ(p)) / σᵢ)²` with Levenberg-Marquardt
/// steps
///
/// ```text
/// (JᵀJ + λ·diag(JᵀJ))·δ = Jᵀr,    r = (y − f(p)) / σ
/// ```
///
/// where `J` is the Jacobian of the σ-weighted model. Each iteration first
/// tries the Gauss-Newton step (`λ = 0`); a candidate that is infeasible or
/// fails to reduce χ² raises the damping. Convergence is declared when
/// `‖Jᵀr‖∞` or the relative step falls below the tolerance, or when no
/// feasible candidate improves χ² (a numerical stationary point).
///
/// # Example
///
/// ```rust
/// use calibra_math::linear_algebra::{Matrix, Vector};
/// use calibra_math::optimization::{NoConstraint, NoJacobian, NonLinearLeastSquares};
///
/// let t: [f64; 4] = [0.0, 1.0, 2.0, 3.0];
/// let observed = Vector::new(t.iter().map(|t| 2.0 * (-0.5 * t).exp()).collect());
/// let model = |p: &Vector| Vector::new(t.iter().map(|t| p[0] * (-p[1] * t).exp()).collect());
///
/// let fit = NonLinearLeastSquares::default()
///     .solve_with_unit_sigma(&observed, model, None::<NoJacobian>, &Vector::new(vec![1.0, 0.1]))
///     .unwrap();
/// assert!((fit.parameters[0] - 2.0).abs() < 1e-6);
/// assert!((fit.parameters[1] - 0.5).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NonLinearLeastSquares {
    config: LeastSquaresConfig,
}

impl NonLinearLeastSquares {
    /// Creates a fitter with the given configuration.
    #[must_use]
    pub fn new(config: LeastSquaresConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LeastSquaresConfig {
        &self.config
    }

    /// Fits with unit sigma and no constraint.
    pub fn solve_with_unit_sigma<M, J>(
        &self,
        observed: &Vector,
        model: M,
        jacobian: Option<J>,
        start: &Vector,
    ) -> MathResult<LeastSquaresResult>
    where
        M: Fn(&Vector) -> Vector,
        J: Fn(&Vector) -> Matrix,
    {
        let sigma = Vector::filled(observed.len(), 1.0);
        self.solve(observed, &sigma, model, jacobian, start, None::<NoConstraint>)
    }

    /// Fits while keeping every accepted parameter vector inside `constraint`.
    pub fn solve_constrained<M, J, C>(
        &self,
        observed: &Vector,
        sigma: &Vector,
        model: M,
        jacobian: Option<J>,
        start: &Vector,
        constraint: C,
    ) -> MathResult<LeastSquaresResult>
    where
        M: Fn(&Vector) -> Vector,
        J: Fn(&Vector) -> Matrix,
        C: Fn(&Vector) -> bool,
    {
        self.solve(observed, sigma, model, jacobian, start, Some(constraint))
    }

    /// Fits `model` to `observed`.
    ///
    /// `jacobian`, when supplied, returns `∂fᵢ/∂pⱼ` of the unweighted model.
    /// `constraint` must hold at `start`; it is checked on every candidate
    /// before the candidate is evaluated or accepted.
    ///
    /// All inputs are validated before the model is first evaluated.
    pub fn solve<M, J, C>(
        &self,
        observed: &Vector,
        sigma: &Vector,
        model: M,
        jacobian: Option<J>,
        start: &Vector,
        constraint: Option<C>,
    ) -> MathResult<LeastSquaresResult>
    where
        M: Fn(&Vector) -> Vector,
        J: Fn(&Vector) -> Matrix,
        C: Fn(&Vector) -> bool,
    {
        let config = &self.config;
        config.validate()?;
        validate_observations(observed, sigma, start)?;

        let feasible = |p: &Vector| constraint.as_ref().map_or(true, |c| c(p));
        if !feasible(start) {
            return Err(MathError::invalid_input("start point violates the constraint"));
        }

        let algebra = config.backend.algebra();
        let decomposition = config.decomposition.decomposition();
        let problem = WeightedProblem {
            observed,
            sigma,
            model: &model,
            jacobian: jacobian.as_ref(),
            finite_difference: &config.finite_difference,
        };

        let mut parameters = start.clone();
        let mut residual = problem.residual(&parameters)?;
        let mut chi_squared = chi_squared_of(algebra, &residual)?;
        if !chi_squared.is_finite() {
            return Err(MathError::invalid_input("model is not finite at the start point"));
        }
        let mut weighted_jacobian = problem.weighted_jacobian(&parameters)?;
        let mut history = vec![chi_squared];
        let mut damping = 0.0;

        debug!(
            "least squares: {} observations, {} parameters, chi2 = {:.6e}",
            observed.len(),
            parameters.len(),
            chi_squared
        );

        let mut iteration = 0;
        loop {
            let gradient = algebra.transpose_multiply_vector(&weighted_jacobian, &residual)?;
            if algebra.norm_infinity(&gradient) < config.tolerance {
                debug!("after {} iterations: gradient below tolerance", iteration);
                break;
            }
            if iteration == config.max_iterations {
                warn!(
                    "least squares: no convergence after {} iterations (chi2 = {:.6e})",
                    iteration, chi_squared
                );
                return Err(MathError::max_iterations(
                    iteration,
                    chi_squared,
                    parameters.into_vec(),
                ));
            }
            iteration += 1;
            let normal = algebra.transpose_multiply_self(&weighted_jacobian);

            let mut accepted = None;
            let mut any_feasible = false;
            for _ in 0..config.max_damping_steps {
                let step = match damped_step(decomposition, &normal, &gradient, damping) {
                    Ok(step) => step,
                    Err(MathError::SingularMatrix) if damping == 0.0 => {
                        damping = config.initial_damping;
                        continue;
                    }
                    Err(MathError::SingularMatrix) => {
                        warn!("least squares: singular normal equations");
                        return Err(MathError::SingularJacobian {
                            iterations: iteration - 1,
                            last_iterate: parameters.into_vec(),
                        });
                    }
                    Err(e) => return Err(e),
                };

                let candidate = algebra.add_vectors(&parameters, &step)?;
                if !feasible(&candidate) {
                    trace!(
                        "iteration {}: infeasible candidate at damping {:.1e}",
                        iteration,
                        damping
                    );
                    damping = raise(damping, config);
                    continue;
                }
                any_feasible = true;

                let candidate_residual = problem.residual(&candidate)?;
                let candidate_chi_squared = chi_squared_of(algebra, &candidate_residual)?;
                if candidate_chi_squared < chi_squared {
                    accepted = Some((candidate, candidate_residual, candidate_chi_squared, step));
                    break;
                }
                trace!(
                    "iteration {}: chi2 {:.6e} not improved at damping {:.1e}",
                    iteration,
                    candidate_chi_squared,
                    damping
                );
                damping = raise(damping, config);
            }

            let Some((candidate, candidate_residual, candidate_chi_squared, step)) = accepted else {
                if any_feasible {
                    debug!("iteration {}: stationary point reached", iteration);
                    break;
                }
                warn!("least squares: no feasible step in iteration {}", iteration);
                return Err(MathError::InfeasibleStep {
                    iteration,
                    last_iterate: parameters.into_vec(),
                });
            };

            parameters = candidate;
            residual = candidate_residual;
            chi_squared = candidate_chi_squared;
            history.push(chi_squared);
            damping /= config.damping_factor;
            weighted_jacobian = problem.weighted_jacobian(&parameters)?;

            debug!(
                "iteration {}: chi2 = {:.6e}, damping = {:.1e}",
                iteration, chi_squared, damping
            );

            let step_norm = algebra.norm2(&step);
            let scale = algebra.norm2(&parameters) + config.tolerance;
            if step_norm <= config.tolerance * scale {
                debug!("iteration {}: step below tolerance", iteration);
                break;
            }
        }

        let normal = algebra.transpose_multiply_self(&weighted_jacobian);
        let covariance = decomposition
            .decompose(&normal)
            .and_then(|d| d.inverse())
            .map_err(|e| match e {
                MathError::SingularMatrix => MathError::SingularJacobian {
                    iterations: iteration,
                    last_iterate: parameters.as_slice().to_vec(),
                },
                other => other,
            })?;
        let projected = algebra.multiply(&covariance, &weighted_jacobian.transpose())?;
        let parameter_sensitivity =
            Matrix::from_fn(projected.rows(), projected.cols(), |k, i| {
                projected[(k, i)] / sigma[i]
            });

        debug!(
            "least squares converged after {} iterations: chi2 = {:.6e}",
            iteration, chi_squared
        );
        Ok(LeastSquaresResult {
            parameters,
            covariance,
            chi_squared,
            parameter_sensitivity,
            iterations: iteration,
            chi_squared_history: history,
        })
    }
}

/// Observations, weights and model of one fit.
struct WeightedProblem<'a, M, J> {
    observed: &'a Vector,
    sigma: &'a Vector,
    model: &'a M,
    jacobian: Option<&'a J>,
    finite_difference: &'a FiniteDifferenceConfig,
}

impl<M, J> WeightedProblem<'_, M, J>
where
    M: Fn(&Vector) -> Vector,
    J: Fn(&Vector) -> Matrix,
{
    /// `(y − f(p)) / σ`
    fn residual(&self, parameters: &Vector) -> MathResult<Vector> {
        let fitted = (self.model)(parameters);
        if fitted.len() != self.observed.len() {
            return Err(MathError::dimension_mismatch(
                (self.observed.len(), 1),
                (fitted.len(), 1),
            ));
        }
        Ok(self
            .observed
            .iter()
            .zip(fitted.iter())
            .zip(self.sigma.iter())
            .map(|((y, f), s)| (y - f) / s)
            .collect())
    }

    /// `∂fᵢ/∂pⱼ / σᵢ`
    fn weighted_jacobian(&self, parameters: &Vector) -> MathResult<Matrix> {
        let raw = match self.jacobian {
            Some(jacobian) => jacobian(parameters),
            None => self
                .finite_difference
                .jacobian(self.model, parameters, None)?,
        };
        let expected = (self.observed.len(), parameters.len());
        if raw.shape() != expected {
            return Err(MathError::dimension_mismatch(expected, raw.shape()));
        }
        Ok(Matrix::from_fn(expected.0, expected.1, |i, j| {
            raw[(i, j)] / self.sigma[i]
        }))
    }
}

/// Solves `(A + λ·diag(A))·δ = g`.
fn damped_step(
    decomposition: &dyn Decomposition,
    normal: &Matrix,
    gradient: &Vector,
    damping: f64,
) -> MathResult<Vector> {
    let damped = if damping == 0.0 {
        normal.clone()
    } else {
        Matrix::from_fn(normal.rows(), normal.cols(), |i, j| {
            if i == j {
                normal[(i, j)] * (1.0 + damping)
            } else {
                normal[(i, j)]
            }
        })
    };
    decomposition.decompose(&damped)?.solve(gradient)
}

fn raise(damping: f64, config: &LeastSquaresConfig) -> f64 {
    if damping == 0.0 {
        config.initial_damping
    } else {
        damping * config.damping_factor
    }
}

/// `Σ rᵢ²`, or infinity when the residual is not finite.
fn chi_squared_of(algebra: &dyn MatrixAlgebra, residual: &Vector) -> MathResult<f64> {
    if residual.is_finite() {
        algebra.inner_product(residual, residual)
    } else {
        Ok(f64::INFINITY)
    }
}
