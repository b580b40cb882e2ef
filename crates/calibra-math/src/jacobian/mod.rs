//! Jacobian management for the Newton driver.
//!
//! - [`initialize_jacobian`] seeds the first estimate, analytically or by
//!   finite differences, and rejects estimates that are not of full rank
//! - [`newton_direction`] turns an estimate and a residual into a search
//!   direction through a [`Decomposition`]
//! - [`broyden_update`] and [`sherman_morrison_update`] refresh the estimate
//!   between iterations without new derivative evaluations
//!
//! Estimates are replaced, never modified in place.

mod finite_difference;
mod update;

pub use finite_difference::{DifferenceScheme, FiniteDifferenceConfig};
pub use update::{broyden_update, sherman_morrison_update, JacobianUpdate};

use log::trace;

use crate::error::{MathError, MathResult};
use crate::linear_algebra::{Decomposition, Matrix, SvdDecomposition, Vector};

/// Evaluates the Jacobian of `function` at `x`.
///
/// Uses the analytic `jacobian` when supplied, otherwise finite differences
/// around `x` (reusing `fx = function(x)`). The result must be
/// `fx.len() x x.len()`.
pub fn evaluate_jacobian<F, J>(
    function: &F,
    jacobian: Option<&J>,
    x: &Vector,
    fx: &Vector,
    finite_difference: &FiniteDifferenceConfig,
) -> MathResult<Matrix>
where
    F: Fn(&Vector) -> Vector,
    J: Fn(&Vector) -> Matrix,
{
    let estimate = match jacobian {
        Some(jacobian) => jacobian(x),
        None => finite_difference.jacobian(function, x, Some(fx))?,
    };

    let expected = (fx.len(), x.len());
    if estimate.shape() != expected {
        return Err(MathError::dimension_mismatch(expected, estimate.shape()));
    }
    Ok(estimate)
}

/// Produces the first Jacobian estimate at `x0`.
///
/// Fails with [`MathError::DegenerateJacobian`] if the estimate has
/// non-finite entries or is rank deficient.
pub fn initialize_jacobian<F, J>(
    function: &F,
    jacobian: Option<&J>,
    x0: &Vector,
    fx0: &Vector,
    finite_difference: &FiniteDifferenceConfig,
) -> MathResult<Matrix>
where
    F: Fn(&Vector) -> Vector,
    J: Fn(&Vector) -> Matrix,
{
    let estimate = evaluate_jacobian(function, jacobian, x0, fx0, finite_difference)?;

    if !estimate.is_finite() {
        return Err(MathError::degenerate_jacobian(
            "initial Jacobian contains non-finite entries",
        ));
    }

    let full_rank = estimate.rows().min(estimate.cols());
    let rank = match SvdDecomposition::new().factorize(&estimate) {
        Ok(svd) => svd.rank(),
        Err(MathError::SingularMatrix) => 0,
        Err(e) => return Err(e),
    };
    if rank < full_rank {
        return Err(MathError::degenerate_jacobian(format!(
            "initial Jacobian has rank {rank}, expected {full_rank}"
        )));
    }

    trace!(
        "initialized {}x{} Jacobian ({})",
        estimate.rows(),
        estimate.cols(),
        if jacobian.is_some() { "analytic" } else { "finite difference" }
    );
    Ok(estimate)
}

/// Newton direction `d = −J⁻¹·r` (least-squares solve for rectangular `J`).
///
/// Decomposition failures, typically [`MathError::SingularMatrix`], are
/// returned unchanged.
pub fn newton_direction(
    decomposition: &dyn Decomposition,
    jacobian: &Matrix,
    residual: &Vector,
) -> MathResult<Vector> {
    let step = decomposition.decompose(jacobian)?.solve(residual)?;
    Ok(step.map(|v| -v))
}
