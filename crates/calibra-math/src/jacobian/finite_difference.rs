//! Finite-difference Jacobian estimation.

use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::linear_algebra::{Matrix, Vector};

/// Difference scheme used to estimate first derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceScheme {
    /// `(f(x + h) - f(x)) / h`
    Forward,
    /// `(f(x + h) - f(x - h)) / 2h`
    #[default]
    Central,
    /// `(f(x) - f(x - h)) / h`
    Backward,
}

/// Finite-difference settings for Jacobian estimation.
///
/// The bump applied to coordinate `j` is `step · (1 + |x_j|)`, so the step is
/// absolute near zero and relative for large coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiniteDifferenceConfig {
    /// Difference scheme.
    pub scheme: DifferenceScheme,
    /// Base step size.
    pub step: f64,
}

impl Default for FiniteDifferenceConfig {
    fn default() -> Self {
        Self {
            scheme: DifferenceScheme::Central,
            step: 1e-6,
        }
    }
}

impl FiniteDifferenceConfig {
    /// Sets the difference scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: DifferenceScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets the base step size.
    #[must_use]
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Checks that the step is positive and finite.
    pub fn validate(&self) -> MathResult<()> {
        if self.step.is_finite() && self.step > 0.0 {
            Ok(())
        } else {
            Err(MathError::invalid_input(format!(
                "finite-difference step must be positive, got {}",
                self.step
            )))
        }
    }

    /// Estimates the Jacobian of `function` at `x`.
    ///
    /// `fx` may carry an already computed `function(x)`; the one-sided
    /// schemes reuse it instead of evaluating again.
    pub fn jacobian<F>(&self, function: F, x: &Vector, fx: Option<&Vector>) -> MathResult<Matrix>
    where
        F: Fn(&Vector) -> Vector,
    {
        self.validate()?;
        let n = x.len();
        if n == 0 {
            return Err(MathError::invalid_input("cannot differentiate at an empty point"));
        }

        let centre = match (self.scheme, fx) {
            (DifferenceScheme::Central, _) => None,
            (_, Some(value)) => Some(value.clone()),
            (_, None) => Some(function(x)),
        };

        let mut columns: Vec<Vector> = Vec::with_capacity(n);
        let mut rows: Option<usize> = centre.as_ref().map(Vector::len);

        for j in 0..n {
            let h = self.step * (1.0 + x[j].abs());
            let (upper, lower, width) = match (self.scheme, &centre) {
                (DifferenceScheme::Forward, Some(c)) => {
                    (function(&x.with_element(j, x[j] + h)), c.clone(), h)
                }
                (DifferenceScheme::Backward, Some(c)) => {
                    (c.clone(), function(&x.with_element(j, x[j] - h)), h)
                }
                _ => (
                    function(&x.with_element(j, x[j] + h)),
                    function(&x.with_element(j, x[j] - h)),
                    2.0 * h,
                ),
            };

            let m = *rows.get_or_insert(upper.len());
            if upper.len() != m || lower.len() != m {
                return Err(MathError::dimension_mismatch(
                    (m, 1),
                    (upper.len().max(lower.len()), 1),
                ));
            }

            columns.push(
                upper
                    .iter()
                    .zip(lower.iter())
                    .map(|(u, l)| (u - l) / width)
                    .collect(),
            );
        }

        let m = rows.unwrap_or(0);
        Ok(Matrix::from_fn(m, n, |i, j| columns[j][i]))
    }
}
