//! Least-squares fitting.
//!
//! - [`NonLinearLeastSquares`]: Levenberg-Marquardt fit of a model
//!   `f(params)` to observations with per-point standard deviations,
//!   optionally restricted to a feasible region
//! - [`GeneralizedLeastSquares`]: linear fit over a set of basis functions,
//!   optionally with a difference penalty on the weights (P-splines)

mod basis;
mod generalized;
mod least_squares;

pub use basis::{
    bspline_basis, polynomial_basis, uniform_bspline_basis, BasisFunction,
    BasisFunctionAggregation,
};
pub use generalized::{difference_matrix, GeneralizedLeastSquares, GeneralizedLeastSquaresResult};
pub use least_squares::NonLinearLeastSquares;

use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::jacobian::FiniteDifferenceConfig;
use crate::linear_algebra::{default_backend, AlgebraBackend, DecompositionMethod, Matrix, Vector};

/// Placeholder type for calls without an analytic model Jacobian.
pub type NoJacobian = fn(&Vector) -> Matrix;

/// Placeholder type for unconstrained fits.
pub type NoConstraint = fn(&Vector) -> bool;

/// Configuration for [`NonLinearLeastSquares`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeastSquaresConfig {
    /// Threshold on `‖Jᵀr‖∞` and on the relative step length.
    pub tolerance: f64,
    /// Maximum number of iterations.
    pub max_iterations: u32,
    /// Decomposition used for the damped normal equations and the covariance.
    pub decomposition: DecompositionMethod,
    /// Algebra back-end.
    pub backend: AlgebraBackend,
    /// First non-zero damping tried when the Gauss-Newton step is rejected.
    pub initial_damping: f64,
    /// Factor applied to the damping after a rejection (and removed after
    /// an acceptance).
    pub damping_factor: f64,
    /// Candidate steps tried per iteration.
    pub max_damping_steps: u32,
    /// Finite differences used when no analytic Jacobian is supplied.
    pub finite_difference: FiniteDifferenceConfig,
}

impl Default for LeastSquaresConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 200,
            decomposition: DecompositionMethod::Svd,
            backend: default_backend(),
            initial_damping: 1e-3,
            damping_factor: 10.0,
            max_damping_steps: 30,
            finite_difference: FiniteDifferenceConfig::default(),
        }
    }
}

impl LeastSquaresConfig {
    /// Sets the tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the maximum iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the decomposition.
    #[must_use]
    pub fn with_decomposition(mut self, decomposition: DecompositionMethod) -> Self {
        self.decomposition = decomposition;
        self
    }

    /// Sets the algebra back-end.
    #[must_use]
    pub fn with_backend(mut self, backend: AlgebraBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the initial damping.
    #[must_use]
    pub fn with_initial_damping(mut self, initial_damping: f64) -> Self {
        self.initial_damping = initial_damping;
        self
    }

    /// Sets the damping factor.
    #[must_use]
    pub fn with_damping_factor(mut self, damping_factor: f64) -> Self {
        self.damping_factor = damping_factor;
        self
    }

    /// Sets the number of candidate steps per iteration.
    #[must_use]
    pub fn with_max_damping_steps(mut self, max_damping_steps: u32) -> Self {
        self.max_damping_steps = max_damping_steps;
        self
    }

    /// Sets the finite-difference settings.
    #[must_use]
    pub fn with_finite_difference(mut self, finite_difference: FiniteDifferenceConfig) -> Self {
        self.finite_difference = finite_difference;
        self
    }

    /// Checks that every setting is usable.
    pub fn validate(&self) -> MathResult<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(MathError::invalid_input(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(MathError::invalid_input("max_iterations must be at least 1"));
        }
        if !(self.initial_damping.is_finite() && self.initial_damping > 0.0) {
            return Err(MathError::invalid_input(format!(
                "initial damping must be positive, got {}",
                self.initial_damping
            )));
        }
        if !(self.damping_factor.is_finite() && self.damping_factor > 1.0) {
            return Err(MathError::invalid_input(format!(
                "damping factor must exceed 1, got {}",
                self.damping_factor
            )));
        }
        if self.max_damping_steps == 0 {
            return Err(MathError::invalid_input("max_damping_steps must be at least 1"));
        }
        self.finite_difference.validate()
    }
}

/// Outcome of a converged non-linear least-squares fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeastSquaresResult {
    /// Fitted parameters.
    pub parameters: Vector,
    /// Parameter covariance `(JᵀJ)⁻¹`, with `J` the Jacobian of the
    /// σ-weighted model.
    pub covariance: Matrix,
    /// `Σ ((yᵢ − fᵢ)/σᵢ)²` at the fitted parameters.
    pub chi_squared: f64,
    /// Sensitivity of each fitted parameter to each observation,
    /// `(JᵀJ)⁻¹·Jᵀ·diag(1/σ)`.
    pub parameter_sensitivity: Matrix,
    /// Number of iterations used.
    pub iterations: u32,
    /// χ² at the start point and after every accepted step.
    pub chi_squared_history: Vec<f64>,
}

impl LeastSquaresResult {
    /// One-standard-deviation parameter uncertainties, `sqrt(diag(covariance))`.
    pub fn standard_errors(&self) -> Vector {
        self.covariance
            .diagonal_values()
            .map(|v| v.max(0.0).sqrt())
    }

    /// Observations minus fitted parameters (zero when under-determined).
    pub fn degrees_of_freedom(&self) -> usize {
        self.parameter_sensitivity
            .cols()
            .saturating_sub(self.parameters.len())
    }
}

/// Checks observations, sigmas and start point before any model evaluation.
fn validate_observations(observed: &Vector, sigma: &Vector, start: &Vector) -> MathResult<()> {
    if observed.is_empty() {
        return Err(MathError::invalid_input("no observations"));
    }
    if start.is_empty() {
        return Err(MathError::invalid_input("no parameters to fit"));
    }
    if sigma.len() != observed.len() {
        return Err(MathError::invalid_input(format!(
            "{} observations but {} sigmas",
            observed.len(),
            sigma.len()
        )));
    }
    if let Some((i, s)) = sigma
        .iter()
        .enumerate()
        .find(|(_, s)| !(s.is_finite() && **s > 0.0))
    {
        return Err(MathError::invalid_input(format!(
            "sigma must be positive and finite, got {s} at index {i}"
        )));
    }
    if !observed.is_finite() {
        return Err(MathError::invalid_input("observations contain non-finite values"));
    }
    if !start.is_finite() {
        return Err(MathError::invalid_input("start point contains non-finite values"));
    }
    Ok(())
}
