use matrixcompare::assert_scalar_eq;
use nalgebra::{dmatrix, Complex};
use pfem1d::kernel::{apply_element, element_norm_squared, fem_to_modal, modal_to_fem, project_modal};
use proptest::collection::vec;
use proptest::prelude::*;
use util::{assert_panics, assert_slices_approx_eq, legendre_polynomials};

/// Evaluates a local FEM expansion at `x` in the reference element.
fn evaluate_fem(fem: &[f64], x: f64) -> f64 {
    let p = fem.len() - 1;
    let legendre = legendre_polynomials(p + 1, x);
    let mut value = fem[0] * (1.0 - x) / 2.0 + fem[p] * (1.0 + x) / 2.0;
    for k in 1..p {
        value += fem[k] * (legendre[k + 1] - legendre[k - 1]);
    }
    value
}

fn evaluate_modal(modal: &[f64], x: f64) -> f64 {
    let legendre = legendre_polynomials(modal.len() - 1, x);
    modal.iter().zip(&legendre).map(|(c, p)| c * p).sum()
}

#[test]
fn apply_element_computes_leading_rows() {
    let matrix = dmatrix![1.0, 2.0;
                          3.0, 4.0;
                          5.0, 6.0];
    let mut full = [0.0; 3];
    apply_element(&matrix, &[1.0, -1.0], &mut full);
    assert_eq!(full, [-1.0, -1.0, -1.0]);

    let mut leading = [7.0; 2];
    apply_element(&matrix, &[2.0, 1.0], &mut leading);
    assert_eq!(leading, [4.0, 10.0]);
}

#[test]
fn apply_element_scales_complex_input_by_real_matrix() {
    let matrix = dmatrix![2.0, 0.0;
                          1.0, 1.0];
    let input = [Complex::new(1.0, 2.0), Complex::new(0.0, -1.0)];
    let mut output = [Complex::new(0.0, 0.0); 2];
    apply_element(&matrix, &input, &mut output);
    assert_eq!(output, [Complex::new(2.0, 4.0), Complex::new(1.0, 1.0)]);
}

#[test]
fn apply_element_rejects_mismatched_input() {
    let matrix = dmatrix![1.0, 2.0];
    assert_panics!(apply_element(&matrix, &[1.0, 2.0, 3.0], &mut [0.0]));
    assert_panics!(apply_element(&matrix, &[1.0, 2.0], &mut [0.0, 0.0]));
}

#[test]
fn modal_to_fem_of_legendre_polynomial() {
    // P_2 = (1 - x) / 2 + (1 + x) / 2 + (P_2 - P_0)
    let mut fem = [0.0; 3];
    modal_to_fem(&[0.0, 0.0, 1.0], &mut fem);
    assert_eq!(fem, [1.0, 1.0, 1.0]);

    // P_3 = -(1 - x) / 2 + (1 + x) / 2 + (P_3 - P_1)
    let mut fem = [0.0; 4];
    modal_to_fem(&[0.0, 0.0, 0.0, 1.0], &mut fem);
    assert_eq!(fem, [-1.0, 0.0, 1.0, 1.0]);
}

#[test]
fn fem_to_modal_of_linear_function() {
    let mut modal = [0.0; 2];
    fem_to_modal(&[1.0, 3.0], &mut modal);
    assert_eq!(modal, [2.0, 1.0]);
}

#[test]
fn fem_kernels_require_degree_one() {
    assert_panics!(modal_to_fem(&[1.0], &mut [0.0]));
    assert_panics!(fem_to_modal(&[1.0], &mut [0.0]));
    assert_panics!(project_modal(&[1.0], &mut [0.0]));
}

#[test]
fn projection_of_constant() {
    // Integrals of the vertex functions are 1, integral of P_2 - P_0 is -2
    let mut load = [0.0; 3];
    project_modal(&[1.0, 0.0, 0.0], &mut load);
    assert_eq!(load, [1.0, -2.0, 1.0]);
}

#[test]
fn projection_of_linear_function() {
    // u = x: vertex integrals are -1/3 and 1/3, integral of x (P_2 - P_0) vanishes
    let mut load = [0.0; 3];
    project_modal(&[0.0, 1.0, 0.0], &mut load);
    assert_scalar_eq!(load[0], -1.0 / 3.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(load[1], 0.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(load[2], 1.0 / 3.0, comp = abs, tol = 1e-15);
}

#[test]
fn element_norm_of_legendre_expansion() {
    assert_scalar_eq!(element_norm_squared(&[1.0_f64, 1.0]), 8.0 / 3.0, comp = abs, tol = 1e-15);
    assert_scalar_eq!(
        element_norm_squared(&[Complex::new(0.0, 1.0), Complex::new(3.0, 4.0)]),
        2.0 + 25.0 * 2.0 / 3.0,
        comp = abs,
        tol = 1e-13
    );
    assert_eq!(element_norm_squared::<f64>(&[]), 0.0);
}

proptest! {
    #[test]
    fn fem_to_modal_inverts_modal_to_fem(modal in vec(-10.0..10.0, 2..10)) {
        let mut fem = vec![0.0; modal.len()];
        let mut recovered = vec![0.0; modal.len()];
        modal_to_fem(&modal, &mut fem);
        fem_to_modal(&fem, &mut recovered);
        assert_slices_approx_eq!(recovered, modal, abstol = 1e-12);
    }

    #[test]
    fn fem_expansion_represents_same_function(modal in vec(-10.0..10.0, 2..8), x in -1.0..1.0) {
        let mut fem = vec![0.0; modal.len()];
        modal_to_fem(&modal, &mut fem);
        let expected = evaluate_modal(&modal, x);
        prop_assert!((evaluate_fem(&fem, x) - expected).abs() <= 1e-10 * (1.0 + expected.abs()));
    }

    #[test]
    fn vertex_coefficients_are_end_values(modal in vec(-10.0..10.0, 2..8)) {
        let mut fem = vec![0.0; modal.len()];
        modal_to_fem(&modal, &mut fem);
        let p = modal.len() - 1;
        prop_assert!((fem[0] - evaluate_modal(&modal, -1.0)).abs() <= 1e-10);
        prop_assert!((fem[p] - evaluate_modal(&modal, 1.0)).abs() <= 1e-10);
    }
}
