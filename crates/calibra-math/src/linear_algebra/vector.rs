//! Immutable dense vector.

use std::ops::Index;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// An immutable, fixed-length sequence of `f64` values.
///
/// There are no mutable accessors: every transformation builds a new
/// vector, so iterates kept for diagnostics stay valid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vector {
    data: Vec<f64>,
}

impl Vector {
    /// Creates a vector that owns the given values.
    #[must_use]
    pub fn new(data: Vec<f64>) -> Self {
        Self { data }
    }

    /// Creates a vector by copying a slice.
    #[must_use]
    pub fn from_slice(data: &[f64]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    /// Creates a vector of zeros.
    #[must_use]
    pub fn zeros(len: usize) -> Self {
        Self::filled(len, 0.0)
    }

    /// Creates a vector with every element set to `value`.
    #[must_use]
    pub fn filled(len: usize, value: f64) -> Self {
        Self {
            data: vec![value; len],
        }
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the vector has no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the element at `index`, if present.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.data.get(index).copied()
    }

    /// Returns the elements as a slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.data.iter()
    }

    /// Consumes the vector and returns its elements.
    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Applies `f` to every element, producing a new vector.
    #[must_use]
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64,
    {
        self.data.iter().map(|&v| f(v)).collect()
    }

    /// Returns a copy with element `index` replaced by `value`.
    ///
    /// Used for coordinate bumps in finite differencing.
    #[must_use]
    pub fn with_element(&self, index: usize, value: f64) -> Self {
        let mut data = self.data.clone();
        data[index] = value;
        Self { data }
    }

    /// Returns true if every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Converts to an `nalgebra` column vector.
    pub fn to_dvector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.data)
    }
}

impl Index<usize> for Vector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.data[index]
    }
}

impl From<Vec<f64>> for Vector {
    fn from(data: Vec<f64>) -> Self {
        Self::new(data)
    }
}

impl From<&[f64]> for Vector {
    fn from(data: &[f64]) -> Self {
        Self::from_slice(data)
    }
}

impl From<DVector<f64>> for Vector {
    fn from(v: DVector<f64>) -> Self {
        Self {
            data: v.iter().copied().collect(),
        }
    }
}

impl FromIterator<f64> for Vector {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Vector {
    type Item = &'a f64;
    type IntoIter = std::slice::Iter<'a, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}
