//! LU decomposition with partial pivoting.

use crate::error::{MathError, MathResult};
use crate::linear_algebra::decomposition::{check_finite, Decomposition, DecompositionResult};
use crate::linear_algebra::{Matrix, Vector};

/// LU decomposition `P·A = L·U` of a square matrix.
///
/// A pivot whose magnitude is below [`Self::PIVOT_TOLERANCE`] times the
/// largest entry of `A` is treated as zero.
#[derive(Debug, Clone, Copy)]
pub struct LuDecomposition;

impl LuDecomposition {
    /// Relative pivot tolerance.
    pub const PIVOT_TOLERANCE: f64 = 1e-14;

    /// Creates an LU decomposition.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Factorizes `matrix`, returning the concrete result type.
    pub fn factorize(&self, matrix: &Matrix) -> MathResult<LuResult> {
        if !matrix.is_square() {
            return Err(MathError::NonSquareMatrix {
                rows: matrix.rows(),
                cols: matrix.cols(),
            });
        }
        check_finite(matrix)?;

        let n = matrix.rows();
        let scale = matrix.as_slice().iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if scale == 0.0 {
            return Err(MathError::SingularMatrix);
        }
        let threshold = Self::PIVOT_TOLERANCE * scale;

        let mut lu = matrix.as_slice().to_vec();
        let mut permutation: Vec<usize> = (0..n).collect();
        let mut sign = 1.0;

        for k in 0..n {
            // Partial pivoting
            let pivot_row = (k..n)
                .max_by(|&a, &b| lu[a * n + k].abs().total_cmp(&lu[b * n + k].abs()))
                .unwrap_or(k);
            if lu[pivot_row * n + k].abs() <= threshold {
                return Err(MathError::SingularMatrix);
            }
            if pivot_row != k {
                for j in 0..n {
                    lu.swap(k * n + j, pivot_row * n + j);
                }
                permutation.swap(k, pivot_row);
                sign = -sign;
            }

            let pivot = lu[k * n + k];
            for i in k + 1..n {
                let factor = lu[i * n + k] / pivot;
                lu[i * n + k] = factor;
                for j in k + 1..n {
                    lu[i * n + j] -= factor * lu[k * n + j];
                }
            }
        }

        Ok(LuResult {
            lu: Matrix::from_row_slice(n, n, &lu)?,
            permutation,
            sign,
            threshold,
        })
    }
}

impl Default for LuDecomposition {
    fn default() -> Self {
        Self::new()
    }
}

impl Decomposition for LuDecomposition {
    fn name(&self) -> &'static str {
        "LU"
    }

    fn decompose(&self, matrix: &Matrix) -> MathResult<Box<dyn DecompositionResult>> {
        Ok(Box::new(self.factorize(matrix)?))
    }
}

/// Packed LU factors: unit lower triangle below the diagonal, `U` on and above.
#[derive(Debug, Clone)]
pub struct LuResult {
    lu: Matrix,
    permutation: Vec<usize>,
    sign: f64,
    threshold: f64,
}

impl LuResult {
    /// Returns the unit lower-triangular factor `L`.
    #[must_use]
    pub fn l(&self) -> Matrix {
        let n = self.lu.rows();
        Matrix::from_fn(n, n, |i, j| match i.cmp(&j) {
            std::cmp::Ordering::Greater => self.lu[(i, j)],
            std::cmp::Ordering::Equal => 1.0,
            std::cmp::Ordering::Less => 0.0,
        })
    }

    /// Returns the upper-triangular factor `U`.
    #[must_use]
    pub fn u(&self) -> Matrix {
        let n = self.lu.rows();
        Matrix::from_fn(n, n, |i, j| if i <= j { self.lu[(i, j)] } else { 0.0 })
    }

    /// Returns the row permutation: row `i` of `P·A` is row `permutation[i]` of `A`.
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Determinant of the decomposed matrix.
    pub fn determinant(&self) -> f64 {
        self.sign * self.lu.diagonal_values().iter().product::<f64>()
    }
}

impl DecompositionResult for LuResult {
    fn shape(&self) -> (usize, usize) {
        self.lu.shape()
    }

    fn solve(&self, b: &Vector) -> MathResult<Vector> {
        let n = self.lu.rows();
        if b.len() != n {
            return Err(MathError::dimension_mismatch((n, n), (b.len(), 1)));
        }

        // Forward substitution: L·y = P·b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let row = self.lu.row(i);
            let sum: f64 = (0..i).map(|j| row[j] * y[j]).sum();
            y[i] = b[self.permutation[i]] - sum;
        }

        // Back substitution: U·x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let row = self.lu.row(i);
            let sum: f64 = (i + 1..n).map(|j| row[j] * x[j]).sum();
            let pivot = row[i];
            if pivot.abs() <= self.threshold {
                return Err(MathError::SingularMatrix);
            }
            x[i] = (y[i] - sum) / pivot;
        }

        Ok(Vector::new(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear_algebra::{MatrixAlgebra, NaiveAlgebra};
    use approx::assert_relative_eq;

    #[test]
    fn test_lu_reconstructs_permuted_matrix() {
        let a = Matrix::from_row_slice(3, 3, &[2.0, 1.0, 1.0, 4.0, 3.0, 3.0, 8.0, 7.0, 9.0])
            .unwrap();

        let result = LuDecomposition::new().factorize(&a).unwrap();
        let product = NaiveAlgebra.multiply(&result.l(), &result.u()).unwrap();

        for (i, &p) in result.permutation().iter().enumerate() {
            for j in 0..3 {
                assert_relative_eq!(product[(i, j)], a[(p, j)], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_solve_linear_system() {
        let a = Matrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]).unwrap();
        let b = Vector::new(vec![5.0, 5.0]);

        let x = LuDecomposition::new().factorize(&a).unwrap().solve(&b).unwrap();

        assert_relative_eq!(x[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_zero_leading_entry_needs_pivot() {
        let a = Matrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]).unwrap();
        let result = LuDecomposition::new().factorize(&a).unwrap();
        let x = result.solve(&Vector::new(vec![3.0, 4.0])).unwrap();
        assert_relative_eq!(x[0], 4.0);
        assert_relative_eq!(x[1], 3.0);
        assert_relative_eq!(result.determinant(), -1.0);
    }

    #[test]
    fn test_determinant() {
        let a = Matrix::from_row_slice(3, 3, &[2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 1.0, 0.0, 4.0])
            .unwrap();
        assert_relative_eq!(LuDecomposition::new().factorize(&a).unwrap().determinant(), 24.0);
    }

    #[test]
    fn test_singular_matrix() {
        let a = Matrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]).unwrap();
        assert!(matches!(
            LuDecomposition::new().factorize(&a),
            Err(MathError::SingularMatrix)
        ));
        assert!(matches!(
            LuDecomposition::new().factorize(&Matrix::zeros(2, 2)),
            Err(MathError::SingularMatrix)
        ));
    }

    #[test]
    fn test_requires_square() {
        let a = Matrix::zeros(2, 3);
        assert!(matches!(
            LuDecomposition::new().decompose(&a),
            Err(MathError::NonSquareMatrix { rows: 2, cols: 3 })
        ));
    }

    #[test]
    fn test_pivot_tolerance_is_relative() {
        let nearly = Matrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0 + 1e-15]).unwrap();
        assert!(matches!(
            LuDecomposition::new().factorize(&nearly),
            Err(MathError::SingularMatrix)
        ));

        let resolvable = Matrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0 + 1e-12]).unwrap();
        assert!(LuDecomposition::new().factorize(&resolvable).is_ok());
    }
}
