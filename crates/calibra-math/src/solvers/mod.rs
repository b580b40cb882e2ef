//! Multidimensional root finding.
//!
//! [`NewtonVectorRootFinder`] solves `f(x) = 0` for a vector field `f`. Each
//! iteration computes a Newton direction from the current Jacobian estimate,
//! takes a backtracking line-search step on the merit `½‖f‖²`, and refreshes
//! the estimate according to the configured [`JacobianUpdate`]:
//!
//! | Update | Per-iteration cost | Notes |
//! |--------|--------------------|-------|
//! | `Full` | Jacobian evaluation + decomposition | quadratic convergence near a root |
//! | `Broyden` | rank-one update + decomposition | no derivatives after the first iterate |
//! | `ShermanMorrison` | rank-one update of `J⁻¹` | no decomposition after the first iterate |
//!
//! # Example
//!
//! ```rust
//! use calibra_math::linear_algebra::{Matrix, Vector};
//! use calibra_math::solvers::{NewtonVectorRootFinder, VectorRootFinder};
//!
//! // x² + y² = 4, x = y
//! let f = |x: &Vector| Vector::new(vec![x[0] * x[0] + x[1] * x[1] - 4.0, x[0] - x[1]]);
//! let jacobian = |x: &Vector| {
//!     Matrix::from_row_slice(2, 2, &[2.0 * x[0], 2.0 * x[1], 1.0, -1.0]).unwrap()
//! };
//!
//! let result = NewtonVectorRootFinder::full_newton()
//!     .find_root(f, Some(jacobian), &Vector::new(vec![1.0, 2.0]))
//!     .unwrap();
//! assert!((result.root[0] - std::f64::consts::SQRT_2).abs() < 1e-8);
//! ```

mod line_search;
mod newton;

pub use line_search::LineSearchConfig;
pub use newton::{NewtonStatus, NewtonVectorRootFinder};

use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::jacobian::{FiniteDifferenceConfig, JacobianUpdate};
use crate::linear_algebra::{default_backend, AlgebraBackend, DecompositionMethod, Matrix, Vector};

/// Default tolerance on the residual norm.
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Default maximum iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 200;

/// Configuration for the Newton root finder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Convergence threshold on `‖f(x)‖₂`.
    pub tolerance: f64,
    /// Maximum number of iterations.
    pub max_iterations: u32,
    /// Decomposition used to compute Newton directions.
    pub decomposition: DecompositionMethod,
    /// Algebra back-end used for vector and matrix arithmetic.
    pub backend: AlgebraBackend,
    /// How the Jacobian estimate is refreshed between iterations.
    pub update: JacobianUpdate,
    /// Backtracking line search.
    pub line_search: LineSearchConfig,
    /// Finite differences used when no analytic Jacobian is supplied.
    pub finite_difference: FiniteDifferenceConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            decomposition: DecompositionMethod::default(),
            backend: default_backend(),
            update: JacobianUpdate::default(),
            line_search: LineSearchConfig::default(),
            finite_difference: FiniteDifferenceConfig::default(),
        }
    }
}

impl SolverConfig {
    /// Creates a configuration with the given tolerance and iteration bound.
    #[must_use]
    pub fn new(tolerance: f64, max_iterations: u32) -> Self {
        Self {
            tolerance,
            max_iterations,
            ..Self::default()
        }
    }

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

    /// Sets the Jacobian update strategy.
    #[must_use]
    pub fn with_update(mut self, update: JacobianUpdate) -> Self {
        self.update = update;
        self
    }

    /// Sets the line search.
    #[must_use]
    pub fn with_line_search(mut self, line_search: LineSearchConfig) -> Self {
        self.line_search = line_search;
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
        self.line_search.validate()?;
        self.finite_difference.validate()
    }
}

/// Outcome of a converged root search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RootFinderResult {
    /// The root found.
    pub root: Vector,
    /// `f(root)`.
    pub residual: Vector,
    /// `‖f(root)‖₂`.
    pub residual_norm: f64,
    /// Number of iterations used.
    pub iterations: u32,
    /// Merit `½‖f‖²` at the start point and after every accepted step.
    pub merit_history: Vec<f64>,
}

/// Trait for multidimensional root finders.
pub trait VectorRootFinder: Send + Sync {
    /// Finds `x` with `function(x) ≈ 0`, starting from `x0`.
    ///
    /// `jacobian` is used when supplied; otherwise derivatives are estimated
    /// by finite differences.
    fn find_root<F, J>(
        &self,
        function: F,
        jacobian: Option<J>,
        x0: &Vector,
    ) -> MathResult<RootFinderResult>
    where
        F: Fn(&Vector) -> Vector,
        J: Fn(&Vector) -> Matrix;

    /// Returns the name of the root finder.
    fn name(&self) -> &'static str;
}
