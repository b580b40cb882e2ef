//! Householder QR decomposition.

use crate::error::{MathError, MathResult};
use crate::linear_algebra::decomposition::{check_finite, Decomposition, DecompositionResult};
use crate::linear_algebra::{Matrix, Vector};

/// QR decomposition `A = Q·R` for matrices with at least as many rows as
/// columns. Rectangular systems are solved in the least-squares sense.
///
/// A diagonal entry of `R` below [`Self::RANK_TOLERANCE`] times the largest
/// one marks the matrix as rank deficient.
#[derive(Debug, Clone, Copy)]
pub struct QrDecomposition;

impl QrDecomposition {
    /// Relative tolerance on the diagonal of `R`.
    pub const RANK_TOLERANCE: f64 = 1e-14;

    /// Creates a QR decomposition.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Factorizes `matrix`, returning the concrete result type.
    pub fn factorize(&self, matrix: &Matrix) -> MathResult<QrResult> {
        let (rows, cols) = matrix.shape();
        if rows < cols {
            return Err(MathError::invalid_input(format!(
                "QR needs rows >= cols, got {rows}x{cols}"
            )));
        }
        if cols == 0 {
            return Err(MathError::invalid_input("cannot decompose an empty matrix"));
        }
        check_finite(matrix)?;

        let qr = matrix.to_dmatrix().qr();
        let q: Matrix = qr.q().into();
        let r: Matrix = qr.r().into();

        let diagonal = r.diagonal_values();
        let largest = diagonal.iter().fold(0.0_f64, |m, d| m.max(d.abs()));
        let threshold = Self::RANK_TOLERANCE * largest;
        if largest == 0.0 || diagonal.iter().any(|d| d.abs() <= threshold) {
            return Err(MathError::SingularMatrix);
        }

        Ok(QrResult { q, r })
    }
}

impl Default for QrDecomposition {
    fn default() -> Self {
        Self::new()
    }
}

impl Decomposition for QrDecomposition {
    fn name(&self) -> &'static str {
        "QR"
    }

    fn decompose(&self, matrix: &Matrix) -> MathResult<Box<dyn DecompositionResult>> {
        Ok(Box::new(self.factorize(matrix)?))
    }
}

/// Thin QR factors: `Q` is `m x n` with orthonormal columns, `R` is `n x n`
/// upper triangular.
#[derive(Debug, Clone)]
pub struct QrResult {
    q: Matrix,
    r: Matrix,
}

impl QrResult {
    /// The orthonormal factor.
    pub fn q(&self) -> &Matrix {
        &self.q
    }

    /// The upper-triangular factor.
    pub fn r(&self) -> &Matrix {
        &self.r
    }
}

impl DecompositionResult for QrResult {
    fn shape(&self) -> (usize, usize) {
        (self.q.rows(), self.r.cols())
    }

    fn solve(&self, b: &Vector) -> MathResult<Vector> {
        let (rows, cols) = self.shape();
        if b.len() != rows {
            return Err(MathError::dimension_mismatch((rows, cols), (b.len(), 1)));
        }

        // R·x = Qᵀ·b
        let qtb: Vec<f64> = (0..cols)
            .map(|j| (0..rows).map(|i| self.q[(i, j)] * b[i]).sum())
            .collect();

        let mut x = vec![0.0; cols];
        for i in (0..cols).rev() {
            let sum: f64 = (i + 1..cols).map(|j| self.r[(i, j)] * x[j]).sum();
            let pivot = self.r[(i, i)];
            if pivot == 0.0 {
                return Err(MathError::SingularMatrix);
            }
            x[i] = (qtb[i] - sum) / pivot;
        }

        Ok(Vector::new(x))
    }
}
