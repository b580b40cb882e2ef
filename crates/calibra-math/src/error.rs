//! Error types for the numerical kernel.

use thiserror::Error;

/// A specialized Result type for numerical operations.
pub type MathResult<T> = Result<T, MathError>;

/// Errors that can occur while running the algebra, decomposition and solver code.
///
/// Every failure is reported to the caller of the single solve call that
/// produced it. Terminal solver failures carry the last iterate so callers
/// can inspect where the iteration stopped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    /// Operand shapes are incompatible.
    #[error("Incompatible dimensions: ({rows1}x{cols1}) and ({rows2}x{cols2})")]
    DimensionMismatch {
        /// Rows in the first operand.
        rows1: usize,
        /// Columns in the first operand.
        cols1: usize,
        /// Rows in the second operand.
        rows2: usize,
        /// Columns in the second operand.
        cols2: usize,
    },

    /// The decomposition requires a square matrix.
    #[error("Matrix must be square, got {rows}x{cols}")]
    NonSquareMatrix {
        /// Rows in the matrix.
        rows: usize,
        /// Columns in the matrix.
        cols: usize,
    },

    /// Matrix is singular (numerically zero pivot or rank zero).
    #[error("Singular matrix: cannot solve")]
    SingularMatrix,

    /// The Newton direction could not be computed from the Jacobian estimate.
    #[error("Singular Jacobian after {iterations} iterations")]
    SingularJacobian {
        /// Iterations completed before the failure.
        iterations: u32,
        /// The iterate at which the Jacobian could not be solved.
        last_iterate: Vec<f64>,
    },

    /// The initial Jacobian estimate is unusable.
    #[error("Degenerate Jacobian: {reason}")]
    DegenerateJacobian {
        /// Description of the defect.
        reason: String,
    },

    /// Invalid input parameter.
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Description of the invalid input.
        reason: String,
    },

    /// The iteration bound was reached without convergence.
    #[error("No convergence after {iterations} iterations (residual: {residual:.2e})")]
    MaxIterationsExceeded {
        /// Number of iterations attempted.
        iterations: u32,
        /// Residual norm (or chi-squared) at the last iterate.
        residual: f64,
        /// The last iterate.
        last_iterate: Vec<f64>,
    },

    /// The constrained fitter could not find a feasible step.
    #[error("No feasible step found in iteration {iteration}")]
    InfeasibleStep {
        /// The iteration in which every candidate step was infeasible.
        iteration: u32,
        /// The last feasible iterate.
        last_iterate: Vec<f64>,
    },
}

impl MathError {
    /// Creates an invalid input error.
    #[must_use]
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Creates a degenerate Jacobian error.
    #[must_use]
    pub fn degenerate_jacobian(reason: impl Into<String>) -> Self {
        Self::DegenerateJacobian {
            reason: reason.into(),
        }
    }

    /// Creates a dimension mismatch error from two `(rows, cols)` shapes.
    #[must_use]
    pub fn dimension_mismatch(first: (usize, usize), second: (usize, usize)) -> Self {
        Self::DimensionMismatch {
            rows1: first.0,
            cols1: first.1,
            rows2: second.0,
            cols2: second.1,
        }
    }

    /// Creates a max-iterations error.
    #[must_use]
    pub fn max_iterations(iterations: u32, residual: f64, last_iterate: Vec<f64>) -> Self {
        Self::MaxIterationsExceeded {
            iterations,
            residual,
            last_iterate,
        }
    }

    /// Returns the last iterate carried by a terminal solver failure.
    pub fn last_iterate(&self) -> Option<&[f64]> {
        match self {
            Self::SingularJacobian { last_iterate, .. }
            | Self::MaxIterationsExceeded { last_iterate, .. }
            | Self::InfeasibleStep { last_iterate, .. } => Some(last_iterate),
            _ => None,
        }
    }
}
