//! Matrix decompositions used as the linear-solve primitive.
//!
//! | Method | Input | Notes |
//! |--------|-------|-------|
//! | [`LuDecomposition`] | square | fastest; fails on a zero pivot |
//! | [`SvdDecomposition`] | any shape | robust to rank deficiency (pseudo-inverse) |
//! | [`QrDecomposition`] | rows ≥ cols | stable least-squares solves |
//!
//! A [`DecompositionResult`] is created for one matrix and is not meant to
//! outlive the Newton iteration that requested it.

mod lu;
mod qr;
mod svd;

pub use lu::{LuDecomposition, LuResult};
pub use qr::{QrDecomposition, QrResult};
pub use svd::{SvdDecomposition, SvdResult};

use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::linear_algebra::{Matrix, Vector};

/// A strategy that factorizes a matrix.
pub trait Decomposition: Send + Sync + std::fmt::Debug {
    /// Name of the decomposition.
    fn name(&self) -> &'static str;

    /// Factorizes `matrix`.
    fn decompose(&self, matrix: &Matrix) -> MathResult<Box<dyn DecompositionResult>>;
}

/// The stored factors of a decomposed matrix `A`.
pub trait DecompositionResult: Send + Sync + std::fmt::Debug {
    /// Shape `(rows, cols)` of the decomposed matrix.
    fn shape(&self) -> (usize, usize);

    /// Solves `A · x = b` (in the least-squares sense for rectangular `A`).
    fn solve(&self, b: &Vector) -> MathResult<Vector>;

    /// Solves `A · X = B` column by column.
    fn solve_matrix(&self, b: &Matrix) -> MathResult<Matrix> {
        let (rows, cols) = self.shape();
        if b.rows() != rows {
            return Err(MathError::dimension_mismatch((rows, cols), b.shape()));
        }
        let columns = (0..b.cols())
            .map(|j| self.solve(&b.column(j)))
            .collect::<MathResult<Vec<_>>>()?;
        Ok(Matrix::from_fn(cols, b.cols(), |i, j| columns[j][i]))
    }

    /// Returns `A⁻¹` (the pseudo-inverse for rectangular `A`).
    fn inverse(&self) -> MathResult<Matrix> {
        self.solve_matrix(&Matrix::identity(self.shape().0))
    }
}

/// Selects a decomposition algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionMethod {
    /// LU with partial pivoting.
    #[default]
    Lu,
    /// Singular value decomposition.
    Svd,
    /// Householder QR.
    Qr,
}

static LU: LuDecomposition = LuDecomposition::new();
static SVD: SvdDecomposition = SvdDecomposition::new();
static QR: QrDecomposition = QrDecomposition::new();

impl DecompositionMethod {
    /// Returns the decomposition strategy with default settings.
    pub fn decomposition(self) -> &'static dyn Decomposition {
        match self {
            Self::Lu => &LU,
            Self::Svd => &SVD,
            Self::Qr => &QR,
        }
    }
}

impl std::str::FromStr for DecompositionMethod {
    type Err = MathError;

    fn from_str(s: &str) -> MathResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lu" => Ok(Self::Lu),
            "svd" | "sv" => Ok(Self::Svd),
            "qr" => Ok(Self::Qr),
            other => Err(MathError::invalid_input(format!(
                "unknown decomposition '{other}' (expected lu, svd or qr)"
            ))),
        }
    }
}

fn check_finite(matrix: &Matrix) -> MathResult<()> {
    if matrix.is_finite() {
        Ok(())
    } else {
        Err(MathError::invalid_input("matrix contains non-finite entries"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_algebra::{MatrixAlgebra, NaiveAlgebra};
    use approx::assert_relative_eq;

    const ALL: [DecompositionMethod; 3] = [
        DecompositionMethod::Lu,
        DecompositionMethod::Svd,
        DecompositionMethod::Qr,
    ];

    #[test]
    fn test_all_methods_solve_square_system() {
        let a = Matrix::from_row_slice(3, 3, &[4.0, -2.0, 1.0, 3.0, 6.0, -4.0, 2.0, 1.0, 8.0])
            .unwrap();
        let b = Vector::new(vec![12.0, -25.0, 32.0]);

        for method in ALL {
            let x = method.decomposition().decompose(&a).unwrap().solve(&b).unwrap();
            let ax = NaiveAlgebra.multiply_vector(&a, &x).unwrap();
            for i in 0..3 {
                assert_relative_eq!(ax[i], b[i], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_inverse_times_matrix_is_identity() {
        let a = Matrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]).unwrap();
        for method in ALL {
            let inv = method.decomposition().decompose(&a).unwrap().inverse().unwrap();
            let product = NaiveAlgebra.multiply(&a, &inv).unwrap();
            for i in 0..2 {
                for j in 0..2 {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert_relative_eq!(product[(i, j)], expected, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_solve_rejects_wrong_length() {
        let a = Matrix::identity(2);
        for method in ALL {
            let result = method.decomposition().decompose(&a).unwrap().solve(&Vector::zeros(3));
            assert!(matches!(result, Err(MathError::DimensionMismatch { .. })));
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        let a = Matrix::from_row_slice(2, 2, &[1.0, f64::NAN, 0.0, 1.0]).unwrap();
        for method in ALL {
            assert!(matches!(
                method.decomposition().decompose(&a),
                Err(MathError::InvalidInput { .. })
            ));
        }
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("LU".parse::<DecompositionMethod>().unwrap(), DecompositionMethod::Lu);
        assert_eq!("sv".parse::<DecompositionMethod>().unwrap(), DecompositionMethod::Svd);
        assert!("cholesky".parse::<DecompositionMethod>().is_err());
    }
}
