//! Linear algebra primitives.
//!
//! - [`Vector`] and [`Matrix`]: immutable dense containers
//! - [`MatrixAlgebra`]: pure operations with interchangeable back-ends
//! - [`decomposition`]: LU, SVD and QR factorizations used to solve `A·x = b`

mod algebra;
pub mod decomposition;
mod matrix;
mod vector;

pub use algebra::{
    default_backend, set_default_backend, AlgebraBackend, MatrixAlgebra, NaiveAlgebra,
    NalgebraAlgebra,
};
pub use decomposition::{
    Decomposition, DecompositionMethod, DecompositionResult, LuDecomposition, QrDecomposition,
    SvdDecomposition,
};
pub use matrix::Matrix;
pub use vector::Vector;
