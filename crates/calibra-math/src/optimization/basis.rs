//! Basis functions for generalized least squares.

use std::fmt;
use std::sync::Arc;

use crate::error::{MathError, MathResult};
use crate::linear_algebra::Vector;

/// A real function of one variable used as a fitting basis element.
pub type BasisFunction = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Monomials `1, x, x², …, x^degree`.
pub fn polynomial_basis(degree: usize) -> Vec<BasisFunction> {
    (0..=degree)
        .map(|k| {
            let power = k as i32;
            Arc::new(move |x: f64| x.powi(power)) as BasisFunction
        })
        .collect()
}

/// B-splines of the given degree on a non-decreasing knot sequence.
///
/// Returns `knots.len() − degree − 1` functions, evaluated with the
/// Cox-de Boor recursion. On `[knots[degree], knots[n]]` (with `n` the
/// number of functions) they form a partition of unity; the right end of
/// that interval is included.
pub fn bspline_basis(knots: &[f64], degree: usize) -> MathResult<Vec<BasisFunction>> {
    if knots.len() < degree + 2 {
        return Err(MathError::invalid_input(format!(
            "degree {degree} B-splines need at least {} knots, got {}",
            degree + 2,
            knots.len()
        )));
    }
    if knots.iter().any(|k| !k.is_finite()) {
        return Err(MathError::invalid_input("knots must be finite"));
    }
    if knots.windows(2).any(|w| w[1] < w[0]) {
        return Err(MathError::invalid_input("knots must be non-decreasing"));
    }

    let count = knots.len() - degree - 1;
    let upper = knots[count];
    let knots: Arc<[f64]> = Arc::from(knots);

    Ok((0..count)
        .map(|index| {
            let knots = Arc::clone(&knots);
            Arc::new(move |x: f64| cox_de_boor(&knots, index, degree, x, upper)) as BasisFunction
        })
        .collect())
}

/// B-splines on `intervals` equal intervals of `[a, b]`, with the knot
/// sequence extended by `degree` equally spaced knots beyond each end.
///
/// Returns `intervals + degree` functions.
pub fn uniform_bspline_basis(
    a: f64,
    b: f64,
    intervals: usize,
    degree: usize,
) -> MathResult<Vec<BasisFunction>> {
    if !(a.is_finite() && b.is_finite() && a < b) {
        return Err(MathError::invalid_input(format!(
            "need a finite interval with a < b, got [{a}, {b}]"
        )));
    }
    if intervals == 0 {
        return Err(MathError::invalid_input("need at least one interval"));
    }

    let h = (b - a) / intervals as f64;
    let mut knots: Vec<f64> = (0..=intervals + 2 * degree)
        .map(|k| a + (k as f64 - degree as f64) * h)
        .collect();
    // Pin the domain ends against rounding in `h`.
    knots[degree] = a;
    knots[intervals + degree] = b;
    bspline_basis(&knots, degree)
}

/// Cox-de Boor recursion. At `x == upper` the last non-empty span is
/// treated as closed so the basis stays a partition of unity there.
fn cox_de_boor(knots: &[f64], index: usize, degree: usize, x: f64, upper: f64) -> f64 {
    if degree == 0 {
        let (left, right) = (knots[index], knots[index + 1]);
        let inside = if x == upper {
            left < x && x <= right
        } else {
            left <= x && x < right
        };
        return if inside { 1.0 } else { 0.0 };
    }

    let mut value = 0.0;
    let left_span = knots[index + degree] - knots[index];
    if left_span > 0.0 {
        value += (x - knots[index]) / left_span * cox_de_boor(knots, index, degree - 1, x, upper);
    }
    let right_span = knots[index + degree + 1] - knots[index + 1];
    if right_span > 0.0 {
        value += (knots[index + degree + 1] - x) / right_span
            * cox_de_boor(knots, index + 1, degree - 1, x, upper);
    }
    value
}

/// A weighted sum of basis functions, `Σ wⱼ·φⱼ(x)`.
#[derive(Clone)]
pub struct BasisFunctionAggregation {
    functions: Vec<BasisFunction>,
    weights: Vector,
}

impl BasisFunctionAggregation {
    /// Combines `functions` with `weights`.
    pub fn new(functions: Vec<BasisFunction>, weights: Vector) -> MathResult<Self> {
        if functions.len() != weights.len() {
            return Err(MathError::invalid_input(format!(
                "{} basis functions but {} weights",
                functions.len(),
                weights.len()
            )));
        }
        Ok(Self { functions, weights })
    }

    /// Evaluates the combination at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.functions
            .iter()
            .zip(self.weights.iter())
            .map(|(f, w)| w * f(x))
            .sum()
    }

    /// The weights.
    pub fn weights(&self) -> &Vector {
        &self.weights
    }

    /// Number of basis functions.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns true if there are no basis functions.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for BasisFunctionAggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasisFunctionAggregation")
            .field("functions", &self.functions.len())
            .field("weights", &self.weights)
            .finish()
    }
}
