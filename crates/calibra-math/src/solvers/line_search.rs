//! Backtracking line search with the Armijo condition.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::linear_algebra::{MatrixAlgebra, Vector};

/// Backtracking line search on the merit `φ(x) = ½‖f(x)‖²`.
///
/// Starting from the full step `α = 1`, the step is multiplied by
/// `contraction` until `φ(x + α·d) ≤ φ(x) + armijo·α·φ'(x; d)` or
/// `max_steps` trial points have been rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchConfig {
    /// Sufficient-decrease constant in `(0, 1)`.
    pub armijo: f64,
    /// Step contraction factor in `(0, 1)`.
    pub contraction: f64,
    /// Trial points per line search.
    pub max_steps: u32,
}

impl Default for LineSearchConfig {
    fn default() -> Self {
        Self {
            armijo: 1e-4,
            contraction: 0.5,
            max_steps: 30,
        }
    }
}

impl LineSearchConfig {
    /// Sets the sufficient-decrease constant.
    #[must_use]
    pub fn with_armijo(mut self, armijo: f64) -> Self {
        self.armijo = armijo;
        self
    }

    /// Sets the contraction factor.
    #[must_use]
    pub fn with_contraction(mut self, contraction: f64) -> Self {
        self.contraction = contraction;
        self
    }

    /// Sets the number of trial points.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Checks that the constants are in range.
    pub fn validate(&self) -> MathResult<()> {
        let in_unit_interval = |v: f64| v > 0.0 && v < 1.0;
        if !in_unit_interval(self.armijo) {
            return Err(MathError::invalid_input(format!(
                "armijo constant must lie in (0, 1), got {}",
                self.armijo
            )));
        }
        if !in_unit_interval(self.contraction) {
            return Err(MathError::invalid_input(format!(
                "contraction must lie in (0, 1), got {}",
                self.contraction
            )));
        }
        if self.max_steps == 0 {
            return Err(MathError::invalid_input("line search needs at least one step"));
        }
        Ok(())
    }

    /// Searches along `direction` from `x`.
    ///
    /// `slope` is the directional derivative of the merit at `x`; positive
    /// values are clamped to zero so that only non-increasing merits are
    /// accepted. Returns `None` when every trial point was rejected.
    pub(crate) fn search<F>(
        &self,
        function: &F,
        algebra: &dyn MatrixAlgebra,
        x: &Vector,
        direction: &Vector,
        merit: f64,
        slope: f64,
    ) -> MathResult<Option<AcceptedStep>>
    where
        F: Fn(&Vector) -> Vector,
    {
        let slope = slope.min(0.0);
        let mut alpha = 1.0;

        for trial in 0..self.max_steps {
            let point = algebra.add_vectors(x, &algebra.scale_vector(direction, alpha))?;
            let value = function(&point);
            let trial_merit = merit_of(algebra, &value);

            trace!(
                "line search trial {}: alpha = {:.3e}, merit = {:.6e}",
                trial,
                alpha,
                trial_merit
            );

            if trial_merit <= merit + self.armijo * alpha * slope {
                return Ok(Some(AcceptedStep {
                    point,
                    value,
                    merit: trial_merit,
                    alpha,
                }));
            }
            alpha *= self.contraction;
        }

        Ok(None)
    }
}

/// A point accepted by the line search.
#[derive(Debug, Clone)]
pub(crate) struct AcceptedStep {
    pub point: Vector,
    pub value: Vector,
    pub merit: f64,
    pub alpha: f64,
}

/// `½‖value‖²`, or infinity when `value` is not finite.
pub(crate) fn merit_of(algebra: &dyn MatrixAlgebra, value: &Vector) -> f64 {
    if !value.is_finite() {
        return f64::INFINITY;
    }
    let norm = algebra.norm2(value);
    0.5 * norm * norm
}
