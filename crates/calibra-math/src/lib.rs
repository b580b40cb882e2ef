//! # Calibra Math
//!
//! Numerical kernel for calibrating models to market data.
//!
//! This crate provides:
//!
//! - **Linear Algebra**: immutable [`Vector`](linear_algebra::Vector) and
//!   [`Matrix`](linear_algebra::Matrix) types, interchangeable algebra
//!   back-ends and LU, SVD and QR decompositions
//! - **Jacobian**: finite-difference estimation and Broyden /
//!   Sherman-Morrison secant updates
//! - **Solvers**: a damped Newton root finder for vector functions
//! - **Optimization**: Levenberg-Marquardt least squares and penalized
//!   basis-function fits
//!
//! ## Design Philosophy
//!
//! - **Immutable data**: every operation returns a new value
//! - **Pluggable numerics**: the algebra back-end and decomposition are
//!   configuration, not code paths
//! - **Diagnosable failures**: terminal solver errors carry the last iterate

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::if_not_else)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::single_match_else)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::derivable_impls)]

pub mod error;
pub mod jacobian;
pub mod linear_algebra;
pub mod optimization;
pub mod solvers;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{MathError, MathResult};
    pub use crate::jacobian::{
        broyden_update, initialize_jacobian, newton_direction, sherman_morrison_update,
        DifferenceScheme, FiniteDifferenceConfig, JacobianUpdate,
    };
    pub use crate::linear_algebra::{
        default_backend, AlgebraBackend, Decomposition, DecompositionMethod, DecompositionResult,
        Matrix, MatrixAlgebra, Vector,
    };
    pub use crate::optimization::{
        bspline_basis, polynomial_basis, uniform_bspline_basis, BasisFunction,
        BasisFunctionAggregation, GeneralizedLeastSquares, LeastSquaresConfig, LeastSquaresResult,
        NonLinearLeastSquares,
    };
    pub use crate::solvers::{
        LineSearchConfig, NewtonVectorRootFinder, RootFinderResult, SolverConfig,
        VectorRootFinder,
    };
}

pub use error::{MathError, MathResult};
