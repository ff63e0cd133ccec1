//! Element-local kernels shared by the parallel operations and the serial reference.
//!
//! Each kernel acts on the data of a single element and has no knowledge of the mesh. Both the
//! parallel and the serial code paths call the same kernels in the same order, which is what
//! makes their results agree to the last bit.
//!
//! Let $c_0, \dots, c_p$ be the Legendre coefficients of a function $u = \sum_n c_n P_n$ on the
//! reference element $[-1, 1]$. The *FEM basis* of degree $p$ consists of the two vertex
//! functions $(1 - x)/2$ and $(1 + x)/2$ and the bubble functions $P_{k + 1} - P_{k - 1}$ for
//! $k = 1, \dots, p - 1$, which vanish at both vertices. Local FEM coefficients are stored as
//! `[left vertex, bubble 1, ..., bubble p - 1, right vertex]`.
use crate::scalar::{real, Scalar};
use nalgebra::DMatrix;
use numeric_literals::replace_float_literals;

/// Computes the leading `output.len()` entries of `matrix * input`.
///
/// # Panics
///
/// Panics if `input.len()` differs from the number of columns of the matrix, or if `output` is
/// longer than the number of rows.
pub fn apply_element<T: Scalar>(matrix: &DMatrix<T::RealField>, input: &[T], output: &mut [T]) {
    assert_eq!(input.len(), matrix.ncols(), "Input length must match matrix columns");
    assert!(output.len() <= matrix.nrows(), "Output must not exceed matrix rows");

    for (i, out_i) in output.iter_mut().enumerate() {
        let mut acc = T::zero();
        for (j, &x_j) in input.iter().enumerate() {
            acc += x_j.scale(matrix[(i, j)]);
        }
        *out_i = acc;
    }
}

/// Converts local Legendre coefficients into local FEM coefficients.
///
/// # Panics
///
/// Panics if the lengths differ or the degree is zero.
pub fn modal_to_fem<T: Scalar>(modal: &[T], fem: &mut [T]) {
    assert_eq!(modal.len(), fem.len());
    assert!(modal.len() >= 2, "FEM basis requires degree >= 1");
    let p = modal.len() - 1;

    // Vertex values: P_n(1) = 1 and P_n(-1) = (-1)^n
    let mut left = T::zero();
    let mut right = T::zero();
    for (n, &c_n) in modal.iter().enumerate() {
        right += c_n;
        if n % 2 == 0 {
            left += c_n;
        } else {
            left -= c_n;
        }
    }

    // What remains after removing the vertex functions vanishes at both ends and is expanded
    // in bubbles from the highest degree down: d_k = c_{k + 1} + d_{k + 2}
    for k in (1..p).rev() {
        let next = if k + 2 < p { fem[k + 2] } else { T::zero() };
        fem[k] = modal[k + 1] + next;
    }
    fem[0] = left;
    fem[p] = right;
}

/// Converts local FEM coefficients into local Legendre coefficients.
///
/// This is the exact inverse of [`modal_to_fem`].
///
/// # Panics
///
/// Panics if the lengths differ or the degree is zero.
#[replace_float_literals(real::<T>(literal))]
pub fn fem_to_modal<T: Scalar>(fem: &[T], modal: &mut [T]) {
    assert_eq!(modal.len(), fem.len());
    assert!(fem.len() >= 2, "FEM basis requires degree >= 1");
    let p = fem.len() - 1;
    let bubble = |k: usize| if k >= 1 && k < p { fem[k] } else { T::zero() };

    let left = fem[0];
    let right = fem[p];
    modal[0] = (left + right).scale(0.5) - bubble(1);
    modal[1] = (right - left).scale(0.5) - bubble(2);
    for n in 2..=p {
        modal[n] = bubble(n - 1) - bubble(n + 1);
    }
}

/// Computes the $L^2$ inner products of a local Legendre expansion with the FEM basis functions
/// on the reference element.
///
/// # Panics
///
/// Panics if the lengths differ or the degree is zero.
pub fn project_modal<T: Scalar>(modal: &[T], load: &mut [T]) {
    assert_eq!(modal.len(), load.len());
    assert!(modal.len() >= 2, "FEM basis requires degree >= 1");
    let p = modal.len() - 1;

    // Uses the orthogonality relation (P_m, P_n) = 2 / (2n + 1) delta_mn
    let third = modal[1].scale(legendre_mass::<T>(1) / real::<T>(2.0));
    load[0] = modal[0] - third;
    load[p] = modal[0] + third;
    for k in 1..p {
        load[k] = modal[k + 1].scale(legendre_mass::<T>(k + 1)) - modal[k - 1].scale(legendre_mass::<T>(k - 1));
    }
}

/// The squared $L^2$ norm of a local Legendre expansion on the reference element.
pub fn element_norm_squared<T: Scalar>(modal: &[T]) -> T::RealField {
    let mut acc = nalgebra::zero::<T::RealField>();
    for (n, &c_n) in modal.iter().enumerate() {
        acc += c_n.modulus_squared() * legendre_mass::<T>(n);
    }
    acc
}

/// The squared $L^2$ norm $2 / (2n + 1)$ of the Legendre polynomial $P_n$ on $[-1, 1]$.
fn legendre_mass<T: Scalar>(n: usize) -> T::RealField {
    real::<T>(2.0 / (2 * n + 1) as f64)
}
