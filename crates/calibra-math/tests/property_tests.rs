//! Property-based tests for the linear-algebra and Jacobian-update invariants.
//!
//! These tests verify properties that should hold for any well-conditioned
//! input:
//! - Every decomposition solves `A·x = b` for a non-singular `A`
//! - The two algebra back-ends agree
//! - Broyden updates satisfy the secant equation and leave directions
//!   orthogonal to the step untouched
//! - Sherman-Morrison updates satisfy the inverse secant equation

use approx::assert_relative_eq;
use proptest::prelude::*;

use calibra_math::jacobian::{broyden_update, sherman_morrison_update};
use calibra_math::linear_algebra::{
    DecompositionMethod, Matrix, MatrixAlgebra, NaiveAlgebra, NalgebraAlgebra, Vector,
};

// =============================================================================
// STRATEGIES
// =============================================================================

/// Square, strictly diagonally dominant (hence non-singular) matrices.
fn dominant_matrix(n: usize) -> impl Strategy<Value = Matrix> {
    prop::collection::vec(-1.0f64..1.0, n * n).prop_map(move |values| {
        Matrix::from_fn(n, n, |i, j| {
            let v = values[i * n + j];
            if i == j {
                v + n as f64 + 1.0
            } else {
                v
            }
        })
    })
}

fn vector(n: usize) -> impl Strategy<Value = Vector> {
    prop::collection::vec(-10.0f64..10.0, n).prop_map(Vector::new)
}

fn system() -> impl Strategy<Value = (Matrix, Vector)> {
    (1usize..7).prop_flat_map(|n| (dominant_matrix(n), vector(n)))
}

fn rectangular_pair() -> impl Strategy<Value = (Matrix, Matrix)> {
    (1usize..6, 1usize..6, 1usize..6).prop_flat_map(|(m, k, n)| {
        (
            prop::collection::vec(-10.0f64..10.0, m * k),
            prop::collection::vec(-10.0f64..10.0, k * n),
        )
            .prop_map(move |(a, b)| {
                (
                    Matrix::from_fn(m, k, |i, j| a[i * k + j]),
                    Matrix::from_fn(k, n, |i, j| b[i * n + j]),
                )
            })
    })
}

/// An estimate, a step and an observed change of matching sizes.
fn secant_step() -> impl Strategy<Value = (Matrix, Vector, Vector)> {
    (1usize..6).prop_flat_map(|n| (dominant_matrix(n), vector(n), vector(n)))
}

fn norm(v: &Vector) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

// =============================================================================
// DECOMPOSITIONS
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_decompositions_solve_linear_systems((a, b) in system()) {
        for method in [DecompositionMethod::Lu, DecompositionMethod::Svd, DecompositionMethod::Qr] {
            let x = method.decomposition().decompose(&a).unwrap().solve(&b).unwrap();
            let reproduced = NaiveAlgebra.multiply_vector(&a, &x).unwrap();
            for i in 0..b.len() {
                assert_relative_eq!(reproduced[i], b[i], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn prop_inverse_is_two_sided((a, _) in system()) {
        let inverse = DecompositionMethod::Lu
            .decomposition()
            .decompose(&a)
            .unwrap()
            .inverse()
            .unwrap();
        let left = NaiveAlgebra.multiply(&inverse, &a).unwrap();
        let right = NaiveAlgebra.multiply(&a, &inverse).unwrap();
        let identity = Matrix::identity(a.rows());
        for i in 0..a.rows() {
            for j in 0..a.cols() {
                assert_relative_eq!(left[(i, j)], identity[(i, j)], epsilon = 1e-9);
                assert_relative_eq!(right[(i, j)], identity[(i, j)], epsilon = 1e-9);
            }
        }
    }

    // =========================================================================
    // ALGEBRA BACK-ENDS
    // =========================================================================

    #[test]
    fn prop_backends_agree_on_products((a, b) in rectangular_pair()) {
        let naive = NaiveAlgebra.multiply(&a, &b).unwrap();
        let fast = NalgebraAlgebra.multiply(&a, &b).unwrap();
        prop_assert_eq!(naive.shape(), fast.shape());
        for i in 0..naive.rows() {
            for j in 0..naive.cols() {
                assert_relative_eq!(naive[(i, j)], fast[(i, j)], epsilon = 1e-10);
            }
        }

        let gram_naive = NaiveAlgebra.transpose_multiply_self(&a);
        let gram_fast = NalgebraAlgebra.transpose_multiply_self(&a);
        for i in 0..gram_naive.rows() {
            for j in 0..gram_naive.cols() {
                assert_relative_eq!(gram_naive[(i, j)], gram_fast[(i, j)], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn prop_backends_agree_on_matrix_vector((a, b) in rectangular_pair()) {
        let x = b.column(0);
        let y = a.column(0);

        let naive = NaiveAlgebra.transpose_multiply_vector(&a, &y).unwrap();
        let fast = NalgebraAlgebra.transpose_multiply_vector(&a, &y).unwrap();
        for i in 0..naive.len() {
            assert_relative_eq!(naive[i], fast[i], epsilon = 1e-10);
        }

        let naive = NaiveAlgebra.multiply_vector(&a, &x).unwrap();
        let fast = NalgebraAlgebra.multiply_vector(&a, &x).unwrap();
        for i in 0..naive.len() {
            assert_relative_eq!(naive[i], fast[i], epsilon = 1e-10);
        }
        assert_relative_eq!(NaiveAlgebra.norm2(&x), NalgebraAlgebra.norm2(&x), epsilon = 1e-12);
    }

    // =========================================================================
    // SECANT UPDATES
    // =========================================================================

    #[test]
    fn prop_broyden_satisfies_secant_equation((previous, dx, dy) in secant_step()) {
        prop_assume!(norm(&dx) > 0.1);

        let updated = broyden_update(&NaiveAlgebra, &dx, &dy, previous).unwrap();
        let image = NaiveAlgebra.multiply_vector(&updated, &dx).unwrap();
        for i in 0..dy.len() {
            assert_relative_eq!(image[i], dy[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn prop_broyden_preserves_orthogonal_directions(
        (previous, dx, dy) in secant_step(),
        v in vector(5),
    ) {
        let n = dx.len();
        prop_assume!(n >= 2 && norm(&dx) > 0.1);

        // Project v onto the complement of dx.
        let v: Vector = v.iter().take(n).copied().collect();
        let along = NaiveAlgebra.inner_product(&v, &dx).unwrap()
            / NaiveAlgebra.inner_product(&dx, &dx).unwrap();
        let orthogonal = NaiveAlgebra
            .subtract_vectors(&v, &NaiveAlgebra.scale_vector(&dx, along))
            .unwrap();

        let before = NaiveAlgebra.multiply_vector(&previous, &orthogonal).unwrap();
        let updated = broyden_update(&NaiveAlgebra, &dx, &dy, previous).unwrap();
        let after = NaiveAlgebra.multiply_vector(&updated, &orthogonal).unwrap();
        for i in 0..n {
            assert_relative_eq!(after[i], before[i], epsilon = 1e-8);
        }
    }

    #[test]
    fn prop_sherman_morrison_satisfies_inverse_secant(
        (_, dx, dy) in secant_step(),
    ) {
        let n = dx.len();
        let dot = NaiveAlgebra.inner_product(&dx, &dy).unwrap();
        prop_assume!(norm(&dx) > 0.1 && dot.abs() > 0.25 * norm(&dx) * norm(&dy));

        let updated = sherman_morrison_update(&NaiveAlgebra, &dx, &dy, Matrix::identity(n)).unwrap();
        let image = NaiveAlgebra.multiply_vector(&updated, &dy).unwrap();
        for i in 0..n {
            assert_relative_eq!(image[i], dx[i], epsilon = 1e-8);
        }
    }
}
