//! Matrix algebra back-ends.
//!
//! [`MatrixAlgebra`] is the contract the solvers program against. Two
//! interchangeable implementations are provided:
//!
//! - [`NaiveAlgebra`]: straightforward loops, used as the reference
//! - [`NalgebraAlgebra`]: delegates to `nalgebra` kernels
//!
//! Both produce the same results up to floating-point rounding. A solve
//! selects one back-end through its configuration and uses it throughout.

use nalgebra::DMatrix;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::linear_algebra::{Matrix, Vector};

/// Algebra operations on [`Vector`] and [`Matrix`].
///
/// All operations are pure. Shape errors are reported as
/// [`MathError::DimensionMismatch`].
pub trait MatrixAlgebra: Send + Sync + std::fmt::Debug {
    /// Name of the back-end.
    fn name(&self) -> &'static str;

    /// Element-wise `a + b`.
    fn add_vectors(&self, a: &Vector, b: &Vector) -> MathResult<Vector>;

    /// Element-wise `a - b`.
    fn subtract_vectors(&self, a: &Vector, b: &Vector) -> MathResult<Vector>;

    /// Element-wise `a + b`.
    fn add_matrices(&self, a: &Matrix, b: &Matrix) -> MathResult<Matrix>;

    /// Element-wise `a - b`.
    fn subtract_matrices(&self, a: &Matrix, b: &Matrix) -> MathResult<Matrix>;

    /// `scale * v`.
    fn scale_vector(&self, v: &Vector, scale: f64) -> Vector;

    /// `scale * m`.
    fn scale_matrix(&self, m: &Matrix, scale: f64) -> Matrix;

    /// Inner product `a · b`.
    fn inner_product(&self, a: &Vector, b: &Vector) -> MathResult<f64>;

    /// Outer product `a ⊗ b`, an `a.len() x b.len()` matrix.
    fn outer_product(&self, a: &Vector, b: &Vector) -> Matrix;

    /// Matrix product `a · b`.
    fn multiply(&self, a: &Matrix, b: &Matrix) -> MathResult<Matrix>;

    /// Matrix-vector product `a · x`.
    fn multiply_vector(&self, a: &Matrix, x: &Vector) -> MathResult<Vector>;

    /// Transposed matrix-vector product `aᵀ · x`.
    fn transpose_multiply_vector(&self, a: &Matrix, x: &Vector) -> MathResult<Vector>;

    /// Spectral norm (largest singular value).
    fn matrix_norm2(&self, m: &Matrix) -> f64;

    /// Euclidean norm.
    fn norm2(&self, v: &Vector) -> f64 {
        v.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    /// Sum of absolute values.
    fn norm1(&self, v: &Vector) -> f64 {
        v.iter().map(|x| x.abs()).sum()
    }

    /// Largest absolute value.
    fn norm_infinity(&self, v: &Vector) -> f64 {
        v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
    }

    /// Maximum absolute column sum.
    fn matrix_norm1(&self, m: &Matrix) -> f64 {
        (0..m.cols())
            .map(|j| (0..m.rows()).map(|i| m[(i, j)].abs()).sum::<f64>())
            .fold(0.0, f64::max)
    }

    /// Maximum absolute row sum.
    fn matrix_norm_infinity(&self, m: &Matrix) -> f64 {
        (0..m.rows())
            .map(|i| m.row(i).iter().map(|x| x.abs()).sum::<f64>())
            .fold(0.0, f64::max)
    }

    /// Frobenius norm.
    fn frobenius_norm(&self, m: &Matrix) -> f64 {
        m.as_slice().iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    /// Sum of the diagonal of a square matrix.
    fn trace(&self, m: &Matrix) -> MathResult<f64> {
        if !m.is_square() {
            return Err(MathError::NonSquareMatrix {
                rows: m.rows(),
                cols: m.cols(),
            });
        }
        Ok(m.diagonal_values().iter().sum())
    }

    /// `alpha · a · x + beta · y`.
    fn gemv(&self, alpha: f64, a: &Matrix, x: &Vector, beta: f64, y: &Vector) -> MathResult<Vector> {
        let ax = self.multiply_vector(a, x)?;
        self.add_vectors(&self.scale_vector(&ax, alpha), &self.scale_vector(y, beta))
    }

    /// `alpha · aᵀ · x + beta · y`.
    fn gemv_transposed(
        &self,
        alpha: f64,
        a: &Matrix,
        x: &Vector,
        beta: f64,
        y: &Vector,
    ) -> MathResult<Vector> {
        let atx = self.transpose_multiply_vector(a, x)?;
        self.add_vectors(&self.scale_vector(&atx, alpha), &self.scale_vector(y, beta))
    }

    /// `aᵀ · a`, the normal-equations matrix.
    fn transpose_multiply_self(&self, a: &Matrix) -> Matrix {
        Matrix::from_fn(a.cols(), a.cols(), |i, j| {
            (0..a.rows()).map(|k| a[(k, i)] * a[(k, j)]).sum()
        })
    }
}

fn check_same_vector(a: &Vector, b: &Vector) -> MathResult<()> {
    if a.len() != b.len() {
        return Err(MathError::dimension_mismatch((a.len(), 1), (b.len(), 1)));
    }
    Ok(())
}

fn check_same_shape(a: &Matrix, b: &Matrix) -> MathResult<()> {
    if a.shape() != b.shape() {
        return Err(MathError::dimension_mismatch(a.shape(), b.shape()));
    }
    Ok(())
}

/// Reference back-end written with plain loops.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaiveAlgebra;

impl NaiveAlgebra {
    const POWER_ITERATIONS: usize = 500;
}

impl MatrixAlgebra for NaiveAlgebra {
    fn name(&self) -> &'static str {
        "naive"
    }

    fn add_vectors(&self, a: &Vector, b: &Vector) -> MathResult<Vector> {
        check_same_vector(a, b)?;
        Ok(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect())
    }

    fn subtract_vectors(&self, a: &Vector, b: &Vector) -> MathResult<Vector> {
        check_same_vector(a, b)?;
        Ok(a.iter().zip(b.iter()).map(|(x, y)| x - y).collect())
    }

    fn add_matrices(&self, a: &Matrix, b: &Matrix) -> MathResult<Matrix> {
        check_same_shape(a, b)?;
        Ok(Matrix::from_fn(a.rows(), a.cols(), |i, j| a[(i, j)] + b[(i, j)]))
    }

    fn subtract_matrices(&self, a: &Matrix, b: &Matrix) -> MathResult<Matrix> {
        check_same_shape(a, b)?;
        Ok(Matrix::from_fn(a.rows(), a.cols(), |i, j| a[(i, j)] - b[(i, j)]))
    }

    fn scale_vector(&self, v: &Vector, scale: f64) -> Vector {
        v.map(|x| x * scale)
    }

    fn scale_matrix(&self, m: &Matrix, scale: f64) -> Matrix {
        Matrix::from_fn(m.rows(), m.cols(), |i, j| m[(i, j)] * scale)
    }

    fn inner_product(&self, a: &Vector, b: &Vector) -> MathResult<f64> {
        check_same_vector(a, b)?;
        Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
    }

    fn outer_product(&self, a: &Vector, b: &Vector) -> Matrix {
        Matrix::from_fn(a.len(), b.len(), |i, j| a[i] * b[j])
    }

    fn multiply(&self, a: &Matrix, b: &Matrix) -> MathResult<Matrix> {
        if a.cols() != b.rows() {
            return Err(MathError::dimension_mismatch(a.shape(), b.shape()));
        }
        Ok(Matrix::from_fn(a.rows(), b.cols(), |i, j| {
            (0..a.cols()).map(|k| a[(i, k)] * b[(k, j)]).sum()
        }))
    }

    fn multiply_vector(&self, a: &Matrix, x: &Vector) -> MathResult<Vector> {
        if a.cols() != x.len() {
            return Err(MathError::dimension_mismatch(a.shape(), (x.len(), 1)));
        }
        Ok((0..a.rows())
            .map(|i| a.row(i).iter().zip(x.iter()).map(|(m, v)| m * v).sum())
            .collect())
    }

    fn transpose_multiply_vector(&self, a: &Matrix, x: &Vector) -> MathResult<Vector> {
        if a.rows() != x.len() {
            return Err(MathError::dimension_mismatch(
                (a.cols(), a.rows()),
                (x.len(), 1),
            ));
        }
        Ok((0..a.cols())
            .map(|j| (0..a.rows()).map(|i| a[(i, j)] * x[i]).sum())
            .collect())
    }

    fn matrix_norm2(&self, m: &Matrix) -> f64 {
        // Power iteration on mᵀm.
        if m.rows() == 0 || m.cols() == 0 {
            return 0.0;
        }
        let mtm = self.transpose_multiply_self(m);
        let n = mtm.rows();
        let mut v = vec![1.0 / (n as f64).sqrt(); n];
        let mut eigenvalue = 0.0;
        for _ in 0..Self::POWER_ITERATIONS {
            let w: Vec<f64> = (0..n)
                .map(|i| mtm.row(i).iter().zip(&v).map(|(a, b)| a * b).sum())
                .collect();
            let norm = w.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm == 0.0 {
                return 0.0;
            }
            v = w.iter().map(|x| x / norm).collect();
            let converged = (norm - eigenvalue).abs() <= 1e-15 * norm;
            eigenvalue = norm;
            if converged {
                break;
            }
        }
        eigenvalue.sqrt()
    }
}

/// Back-end delegating to `nalgebra`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NalgebraAlgebra;

impl MatrixAlgebra for NalgebraAlgebra {
    fn name(&self) -> &'static str {
        "nalgebra"
    }

    fn add_vectors(&self, a: &Vector, b: &Vector) -> MathResult<Vector> {
        check_same_vector(a, b)?;
        Ok((a.to_dvector() + b.to_dvector()).into())
    }

    fn subtract_vectors(&self, a: &Vector, b: &Vector) -> MathResult<Vector> {
        check_same_vector(a, b)?;
        Ok((a.to_dvector() - b.to_dvector()).into())
    }

    fn add_matrices(&self, a: &Matrix, b: &Matrix) -> MathResult<Matrix> {
        check_same_shape(a, b)?;
        Ok((a.to_dmatrix() + b.to_dmatrix()).into())
    }

    fn subtract_matrices(&self, a: &Matrix, b: &Matrix) -> MathResult<Matrix> {
        check_same_shape(a, b)?;
        Ok((a.to_dmatrix() - b.to_dmatrix()).into())
    }

    fn scale_vector(&self, v: &Vector, scale: f64) -> Vector {
        (v.to_dvector() * scale).into()
    }

    fn scale_matrix(&self, m: &Matrix, scale: f64) -> Matrix {
        (m.to_dmatrix() * scale).into()
    }

    fn inner_product(&self, a: &Vector, b: &Vector) -> MathResult<f64> {
        check_same_vector(a, b)?;
        Ok(a.to_dvector().dot(&b.to_dvector()))
    }

    fn outer_product(&self, a: &Vector, b: &Vector) -> Matrix {
        (a.to_dvector() * b.to_dvector().transpose()).into()
    }

    fn multiply(&self, a: &Matrix, b: &Matrix) -> MathResult<Matrix> {
        if a.cols() != b.rows() {
            return Err(MathError::dimension_mismatch(a.shape(), b.shape()));
        }
        Ok((a.to_dmatrix() * b.to_dmatrix()).into())
    }

    fn multiply_vector(&self, a: &Matrix, x: &Vector) -> MathResult<Vector> {
        if a.cols() != x.len() {
            return Err(MathError::dimension_mismatch(a.shape(), (x.len(), 1)));
        }
        Ok((a.to_dmatrix() * x.to_dvector()).into())
    }

    fn transpose_multiply_vector(&self, a: &Matrix, x: &Vector) -> MathResult<Vector> {
        if a.rows() != x.len() {
            return Err(MathError::dimension_mismatch(
                (a.cols(), a.rows()),
                (x.len(), 1),
            ));
        }
        Ok((a.to_dmatrix().tr_mul(&x.to_dvector())).into())
    }

    fn matrix_norm2(&self, m: &Matrix) -> f64 {
        if m.rows() == 0 || m.cols() == 0 {
            return 0.0;
        }
        let dm: DMatrix<f64> = m.to_dmatrix();
        dm.singular_values().max()
    }

    fn norm2(&self, v: &Vector) -> f64 {
        v.to_dvector().norm()
    }

    fn transpose_multiply_self(&self, a: &Matrix) -> Matrix {
        let dm = a.to_dmatrix();
        dm.tr_mul(&dm).into()
    }
}

/// Selects an algebra back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgebraBackend {
    /// Plain-loop reference implementation.
    Naive,
    /// `nalgebra`-backed implementation.
    #[default]
    Nalgebra,
}

static NAIVE: NaiveAlgebra = NaiveAlgebra;
static NALGEBRA: NalgebraAlgebra = NalgebraAlgebra;
static DEFAULT_BACKEND: OnceCell<AlgebraBackend> = OnceCell::new();

impl AlgebraBackend {
    /// Returns the back-end implementation.
    pub fn algebra(self) -> &'static dyn MatrixAlgebra {
        match self {
            Self::Naive => &NAIVE,
            Self::Nalgebra => &NALGEBRA,
        }
    }
}

/// Fixes the process-wide default back-end.
///
/// The choice is made once. Repeating the same choice is accepted; a
/// conflicting second choice fails with [`MathError::InvalidInput`].
pub fn set_default_backend(backend: AlgebraBackend) -> MathResult<()> {
    let chosen = *DEFAULT_BACKEND.get_or_init(|| backend);
    if chosen == backend {
        Ok(())
    } else {
        Err(MathError::invalid_input(format!(
            "default algebra back-end already set to {chosen:?}"
        )))
    }
}

/// Returns the process-wide default back-end ([`AlgebraBackend::Nalgebra`]
/// unless [`set_default_backend`] chose otherwise).
pub fn default_backend() -> AlgebraBackend {
    DEFAULT_BACKEND.get().copied().unwrap_or_default()
}
