//! Singular value decomposition.

use nalgebra::SVD;

use crate::error::{MathError, MathResult};
use crate::linear_algebra::decomposition::{check_finite, Decomposition, DecompositionResult};
use crate::linear_algebra::{Matrix, Vector};

/// Singular value decomposition `A = U·Σ·Vᵀ`.
///
/// Accepts rectangular input. Solves use the pseudo-inverse, discarding
/// singular values below `max(m, n)·ε·σ_max`, so rank-deficient systems
/// return the minimum-norm least-squares solution.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvdDecomposition;

impl SvdDecomposition {
    /// Creates an SVD decomposition.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Factorizes `matrix`, returning the concrete result type.
    pub fn factorize(&self, matrix: &Matrix) -> MathResult<SvdResult> {
        check_finite(matrix)?;
        let (rows, cols) = matrix.shape();
        if rows == 0 || cols == 0 {
            return Err(MathError::invalid_input("cannot decompose an empty matrix"));
        }

        let svd = SVD::new(matrix.to_dmatrix(), true, true);
        let u = svd
            .u
            .ok_or_else(|| MathError::invalid_input("SVD did not produce U"))?;
        let v_t = svd
            .v_t
            .ok_or_else(|| MathError::invalid_input("SVD did not produce Vᵀ"))?;
        let singular_values: Vector = svd.singular_values.into();

        let sigma_max = singular_values.iter().fold(0.0_f64, |m, &s| m.max(s));
        if sigma_max == 0.0 {
            return Err(MathError::SingularMatrix);
        }
        let threshold = rows.max(cols) as f64 * f64::EPSILON * sigma_max;

        Ok(SvdResult {
            u: (&u).into(),
            singular_values,
            v_t: (&v_t).into(),
            threshold,
        })
    }
}

impl Decomposition for SvdDecomposition {
    fn name(&self) -> &'static str {
        "SVD"
    }

    fn decompose(&self, matrix: &Matrix) -> MathResult<Box<dyn DecompositionResult>> {
        Ok(Box::new(self.factorize(matrix)?))
    }
}

/// Thin SVD factors.
#[derive(Debug, Clone)]
pub struct SvdResult {
    u: Matrix,
    singular_values: Vector,
    v_t: Matrix,
    threshold: f64,
}

impl SvdResult {
    /// Left singular vectors (`m x k`).
    pub fn u(&self) -> &Matrix {
        &self.u
    }

    /// Singular values (length `k = min(m, n)`).
    pub fn singular_values(&self) -> &Vector {
        &self.singular_values
    }

    /// Transposed right singular vectors (`k x n`).
    pub fn v_t(&self) -> &Matrix {
        &self.v_t
    }

    /// Number of singular values above the truncation threshold.
    pub fn rank(&self) -> usize {
        self.singular_values
            .iter()
            .filter(|&&s| s > self.threshold)
            .count()
    }

    /// Ratio of the largest to the smallest singular value.
    pub fn condition_number(&self) -> f64 {
        let max = self.singular_values.iter().fold(0.0_f64, |m, &s| m.max(s));
        let min = self
            .singular_values
            .iter()
            .fold(f64::INFINITY, |m, &s| m.min(s));
        if min == 0.0 {
            f64::INFINITY
        } else {
            max / min
        }
    }
}

impl DecompositionResult for SvdResult {
    fn shape(&self) -> (usize, usize) {
        (self.u.rows(), self.v_t.cols())
    }

    fn solve(&self, b: &Vector) -> MathResult<Vector> {
        let (rows, cols) = self.shape();
        if b.len() != rows {
            return Err(MathError::dimension_mismatch((rows, cols), (b.len(), 1)));
        }

        // x = V · Σ⁺ · Uᵀ · b
        let k = self.singular_values.len();
        let mut x = vec![0.0; cols];
        for s in 0..k {
            let sigma = self.singular_values[s];
            if sigma <= self.threshold {
                continue;
            }
            let coefficient = (0..rows).map(|i| self.u[(i, s)] * b[i]).sum::<f64>() / sigma;
            for (j, xj) in x.iter_mut().enumerate() {
                *xj += coefficient * self.v_t[(s, j)];
            }
        }

        Ok(Vector::new(x))
    }
}
