//! Secant updates of the Jacobian estimate.

use serde::{Deserialize, Serialize};

use crate::error::{MathError, MathResult};
use crate::linear_algebra::{Matrix, MatrixAlgebra, Vector};

/// How the Newton driver refreshes its Jacobian estimate between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JacobianUpdate {
    /// Re-evaluate the Jacobian at every new iterate.
    Full,
    /// Broyden's rank-one update of the Jacobian.
    #[default]
    Broyden,
    /// Sherman-Morrison rank-one update of the inverse Jacobian.
    ShermanMorrison,
}

impl JacobianUpdate {
    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Full => "Newton",
            Self::Broyden => "Broyden",
            Self::ShermanMorrison => "Sherman-Morrison",
        }
    }
}

impl std::str::FromStr for JacobianUpdate {
    type Err = MathError;

    fn from_str(s: &str) -> MathResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" | "newton" => Ok(Self::Full),
            "broyden" => Ok(Self::Broyden),
            "sherman_morrison" | "sherman-morrison" => Ok(Self::ShermanMorrison),
            other => Err(MathError::invalid_input(format!(
                "unknown Jacobian update '{other}'"
            ))),
        }
    }
}

/// Broyden's rank-one secant update.
///
/// ```text
/// J_new = J + ((Δy − J·Δx) ⊗ Δx) / (Δx · Δx)
/// ```
///
/// The result satisfies the secant equation `J_new·Δx = Δy`. A zero step
/// returns `previous` unchanged.
pub fn broyden_update(
    algebra: &dyn MatrixAlgebra,
    delta_x: &Vector,
    delta_y: &Vector,
    previous: Matrix,
) -> MathResult<Matrix> {
    check_step_shapes(&previous, delta_x, delta_y, false)?;

    let length_squared = algebra.inner_product(delta_x, delta_x)?;
    if length_squared == 0.0 {
        return Ok(previous);
    }

    let predicted = algebra.multiply_vector(&previous, delta_x)?;
    let defect = algebra.subtract_vectors(delta_y, &predicted)?;
    let correction = algebra.scale_matrix(
        &algebra.outer_product(&defect, delta_x),
        1.0 / length_squared,
    );
    algebra.add_matrices(&previous, &correction)
}

/// Sherman-Morrison update of an inverse Jacobian estimate `H ≈ J⁻¹`.
///
/// ```text
/// H_new = H + ((Δx − H·Δy) ⊗ (Hᵀ·Δx)) / (Δx · H·Δy)
/// ```
///
/// This is the inverse of the Broyden-updated Jacobian, so the driver never
/// has to decompose a matrix between iterations. A zero denominator returns
/// `previous_inverse` unchanged.
pub fn sherman_morrison_update(
    algebra: &dyn MatrixAlgebra,
    delta_x: &Vector,
    delta_y: &Vector,
    previous_inverse: Matrix,
) -> MathResult<Matrix> {
    check_step_shapes(&previous_inverse, delta_x, delta_y, true)?;

    let h_dy = algebra.multiply_vector(&previous_inverse, delta_y)?;
    let denominator = algebra.inner_product(delta_x, &h_dy)?;
    if denominator == 0.0 {
        return Ok(previous_inverse);
    }

    let defect = algebra.subtract_vectors(delta_x, &h_dy)?;
    let row = algebra.transpose_multiply_vector(&previous_inverse, delta_x)?;
    let correction = algebra.scale_matrix(&algebra.outer_product(&defect, &row), 1.0 / denominator);
    algebra.add_matrices(&previous_inverse, &correction)
}

fn check_step_shapes(
    estimate: &Matrix,
    delta_x: &Vector,
    delta_y: &Vector,
    inverse: bool,
) -> MathResult<()> {
    let (x_len, y_len) = if inverse {
        (estimate.rows(), estimate.cols())
    } else {
        (estimate.cols(), estimate.rows())
    };
    if delta_x.len() != x_len {
        return Err(MathError::dimension_mismatch(estimate.shape(), (delta_x.len(), 1)));
    }
    if delta_y.len() != y_len {
        return Err(MathError::dimension_mismatch(estimate.shape(), (delta_y.len(), 1)));
    }
    Ok(())
}
