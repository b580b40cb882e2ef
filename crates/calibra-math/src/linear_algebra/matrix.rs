//! Immutable dense matrix.

use std::ops::Index;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::linear_algebra::Vector;

/// An immutable, rectangular, row-major matrix of `f64` values.
///
/// Transformations (updates, transposes, products) always return a new
/// matrix; an instance handed out to a caller never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMatrix")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

/// Unchecked serialized form; shape is validated on the way in.
#[derive(Deserialize)]
struct RawMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl TryFrom<RawMatrix> for Matrix {
    type Error = MathError;

    fn try_from(raw: RawMatrix) -> MathResult<Self> {
        Self::from_row_slice(raw.rows, raw.cols, &raw.data)
    }
}

impl Matrix {
    /// Creates a matrix from a list of rows.
    ///
    /// Fails with [`MathError::DimensionMismatch`] if the rows have
    /// different lengths.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> MathResult<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(n_rows * n_cols);

        for row in rows {
            if row.len() != n_cols {
                return Err(MathError::dimension_mismatch((1, n_cols), (1, row.len())));
            }
            data.extend(row);
        }

        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    /// Creates a matrix from row-major data.
    pub fn from_row_slice(rows: usize, cols: usize, data: &[f64]) -> MathResult<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(MathError::invalid_input(format!(
                "{} values cannot fill a {}x{} matrix",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self {
            rows,
            cols,
            data: data.to_vec(),
        })
    }

    /// Creates a matrix whose `(i, j)` entry is `f(i, j)`.
    #[must_use]
    pub fn from_fn<F>(rows: usize, cols: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> f64,
    {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    /// Creates a zero matrix.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Creates an identity matrix.
    #[must_use]
    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    /// Creates a square matrix with `diagonal` on its main diagonal.
    #[must_use]
    pub fn diagonal(diagonal: &Vector) -> Self {
        let n = diagonal.len();
        Self::from_fn(n, n, |i, j| if i == j { diagonal[i] } else { 0.0 })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Returns true for a square matrix.
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Returns the `(i, j)` entry, if in range.
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i < self.rows && j < self.cols {
            Some(self.data[i * self.cols + j])
        } else {
            None
        }
    }

    /// Returns row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Returns column `j` as a new vector.
    #[must_use]
    pub fn column(&self, j: usize) -> Vector {
        (0..self.rows).map(|i| self[(i, j)]).collect()
    }

    /// Returns the main diagonal.
    #[must_use]
    pub fn diagonal_values(&self) -> Vector {
        (0..self.rows.min(self.cols)).map(|i| self[(i, i)]).collect()
    }

    /// Row-major view of the entries.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Returns the transpose.
    #[must_use]
    pub fn transpose(&self) -> Self {
        Self::from_fn(self.cols, self.rows, |i, j| self[(j, i)])
    }

    /// Returns true if every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Converts to an `nalgebra` matrix.
    pub fn to_dmatrix(&self) -> DMatrix<f64> {
        DMatrix::from_row_slice(self.rows, self.cols, &self.data)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        assert!(
            i < self.rows && j < self.cols,
            "index ({i}, {j}) out of range for {}x{} matrix",
            self.rows,
            self.cols
        );
        &self.data[i * self.cols + j]
    }
}

impl From<DMatrix<f64>> for Matrix {
    fn from(m: DMatrix<f64>) -> Self {
        let (rows, cols) = m.shape();
        Self::from_fn(rows, cols, |i, j| m[(i, j)])
    }
}

impl From<&DMatrix<f64>> for Matrix {
    fn from(m: &DMatrix<f64>) -> Self {
        let (rows, cols) = m.shape();
        Self::from_fn(rows, cols, |i, j| m[(i, j)])
    }
}
