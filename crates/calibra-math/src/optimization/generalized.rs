//! Generalized (basis-function) least squares with an optional difference
//! penalty.

use log::debug;

use crate::error::{MathError, MathResult};
use crate::linear_algebra::{default_backend, AlgebraBackend, DecompositionMethod, Matrix, Vector};
use crate::optimization::{BasisFunction, BasisFunctionAggregation};

/// Linear least-squares fit of `y ≈ Σ wⱼ·φⱼ(x)`.
///
/// Observations are weighted by `1/σ²`. With a penalty `λ > 0` the fit
/// minimizes
///
/// ```text
/// Σ ((yᵢ − Σ wⱼ·φⱼ(xᵢ)) / σᵢ)² + λ·‖D_k·w‖²
/// ```
///
/// where `D_k` is the `k`-th order difference matrix. On a B-spline basis
/// this is a P-spline smoother.
#[derive(Debug, Clone, Copy)]
pub struct GeneralizedLeastSquares {
    decomposition: DecompositionMethod,
    backend: AlgebraBackend,
}

impl Default for GeneralizedLeastSquares {
    fn default() -> Self {
        Self {
            decomposition: DecompositionMethod::Svd,
            backend: default_backend(),
        }
    }
}

/// Outcome of a generalized least-squares fit.
#[derive(Debug, Clone)]
pub struct GeneralizedLeastSquaresResult {
    /// Basis-function weights.
    pub parameters: Vector,
    /// Covariance of the weights, the inverse of the (penalized) normal matrix.
    pub covariance: Matrix,
    /// Weighted sum of squared residuals.
    pub chi_squared: f64,
    /// `λ·‖D_k·w‖²` (zero for an unpenalized fit).
    pub penalty: f64,
    /// The fitted curve.
    pub fitted: BasisFunctionAggregation,
}

impl GeneralizedLeastSquares {
    /// Creates a fitter using SVD and the default algebra back-end.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the decomposition used for the normal equations.
    #[must_use]
    pub fn with_decomposition(mut self, decomposition: DecompositionMethod) -> Self {
        self.decomposition = decomposition;
        self
    }

    /// Sets the algebra back-end.
    #[must_use]
    pub fn with_backend(mut self, backend: AlgebraBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Unpenalized fit.
    pub fn solve(
        &self,
        x: &Vector,
        y: &Vector,
        sigma: &Vector,
        basis: &[BasisFunction],
    ) -> MathResult<GeneralizedLeastSquaresResult> {
        self.solve_penalized(x, y, sigma, basis, 0.0, 0)
    }

    /// Fit with penalty `lambda·‖D_order·w‖²`.
    pub fn solve_penalized(
        &self,
        x: &Vector,
        y: &Vector,
        sigma: &Vector,
        basis: &[BasisFunction],
        lambda: f64,
        order: usize,
    ) -> MathResult<GeneralizedLeastSquaresResult> {
        let m = x.len();
        let n = basis.len();
        if m == 0 || n == 0 {
            return Err(MathError::invalid_input(
                "need at least one observation and one basis function",
            ));
        }
        if y.len() != m || sigma.len() != m {
            return Err(MathError::invalid_input(format!(
                "{} abscissae, {} observations and {} sigmas",
                m,
                y.len(),
                sigma.len()
            )));
        }
        if sigma.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(MathError::invalid_input("sigma must be positive and finite"));
        }
        if !x.is_finite() || !y.is_finite() {
            return Err(MathError::invalid_input("data contain non-finite values"));
        }
        if !(lambda.is_finite() && lambda >= 0.0) {
            return Err(MathError::invalid_input(format!(
                "penalty must be non-negative, got {lambda}"
            )));
        }

        let algebra = self.backend.algebra();
        let design = Matrix::from_fn(m, n, |i, j| basis[j](x[i]) / sigma[i]);
        if !design.is_finite() {
            return Err(MathError::invalid_input(
                "basis functions are not finite at the data points",
            ));
        }
        let weighted_y: Vector = y.iter().zip(sigma.iter()).map(|(y, s)| y / s).collect();

        let mut normal = algebra.transpose_multiply_self(&design);
        let difference = if lambda > 0.0 {
            let d = difference_matrix(n, order)?;
            let roughness = algebra.scale_matrix(&algebra.transpose_multiply_self(&d), lambda);
            normal = algebra.add_matrices(&normal, &roughness)?;
            Some(d)
        } else {
            None
        };
        let rhs = algebra.transpose_multiply_vector(&design, &weighted_y)?;

        let factors = self.decomposition.decomposition().decompose(&normal)?;
        let parameters = factors.solve(&rhs)?;
        let covariance = factors.inverse()?;

        let predicted = algebra.multiply_vector(&design, &parameters)?;
        let residual = algebra.subtract_vectors(&weighted_y, &predicted)?;
        let chi_squared = algebra.inner_product(&residual, &residual)?;
        let penalty = match &difference {
            Some(d) => {
                let dw = algebra.multiply_vector(d, &parameters)?;
                lambda * algebra.inner_product(&dw, &dw)?
            }
            None => 0.0,
        };

        debug!(
            "generalized least squares: {} points, {} basis functions, chi2 = {:.6e}, penalty = {:.6e}",
            m, n, chi_squared, penalty
        );

        Ok(GeneralizedLeastSquaresResult {
            fitted: BasisFunctionAggregation::new(basis.to_vec(), parameters.clone())?,
            parameters,
            covariance,
            chi_squared,
            penalty,
        })
    }
}

/// The `(n − order) x n` matrix of `order`-th differences.
///
/// Order 0 is the identity; order 1 has rows `[−1, 1]`; order 2 has rows
/// `[1, −2, 1]`.
pub fn difference_matrix(n: usize, order: usize) -> MathResult<Matrix> {
    if order >= n {
        return Err(MathError::invalid_input(format!(
            "difference order {order} needs more than {n} coefficients"
        )));
    }

    let mut stencil = vec![1.0];
    for _ in 0..order {
        let mut next = vec![0.0; stencil.len() + 1];
        for (j, c) in stencil.iter().enumerate() {
            next[j] -= c;
            next[j + 1] += c;
        }
        stencil = next;
    }

    Ok(Matrix::from_fn(n - order, n, |i, j| {
        if j >= i && j - i < stencil.len() {
            stencil[j - i]
        } else {
            0.0
        }
    }))
}
