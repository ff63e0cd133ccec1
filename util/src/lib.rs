//! Helpers shared by the tests and benchmarks: Legendre basis matrices, sample meshes and
//! approximate assertions.
use eyre::eyre;
use nalgebra::{ComplexField, DMatrix};
use num::Zero;
use std::f64::consts::PI;

/// Poor man's approx assertion for slices of real or complex numbers
#[macro_export]
macro_rules! assert_slices_approx_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let x = &$x[..];
        let y = &$y[..];
        assert_eq!(x.len(), y.len(), "Slices must have the same length");
        let max_absdiff = $crate::max_abs_diff(x, y);
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("max absdiff: {:e}", max_absdiff);
            println!("left: {:?}", x);
            println!("right: {:?}", y);
        }
        assert!(approx_eq);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// The largest modulus of the entry-wise difference of two slices.
pub fn max_abs_diff<T: ComplexField<RealField = f64> + Copy>(x: &[T], y: &[T]) -> f64 {
    x.iter()
        .zip(y)
        .map(|(&a, &b)| (a - b).modulus())
        .fold(0.0, f64::max)
}

/// Relative error `|x - y| / |y|` in the Euclidean norm, or the absolute error if `y` is zero.
pub fn relative_error<T: ComplexField<RealField = f64> + Copy>(x: &[T], y: &[T]) -> f64 {
    assert_eq!(x.len(), y.len());
    let diff: f64 = x.iter().zip(y).map(|(&a, &b)| (a - b).modulus_squared()).sum();
    let reference: f64 = y.iter().map(|b| b.modulus_squared()).sum();
    if reference.is_zero() {
        diff.sqrt()
    } else {
        (diff / reference).sqrt()
    }
}

/// Evaluates the Legendre polynomials `P_0, ..., P_{max_degree}` at `x`.
pub fn legendre_polynomials(max_degree: usize, x: f64) -> Vec<f64> {
    let mut values = Vec::with_capacity(max_degree + 1);
    values.push(1.0);
    if max_degree >= 1 {
        values.push(x);
    }
    // (n + 1) P_{n + 1} = (2n + 1) x P_n - n P_{n - 1}
    for n in 1..max_degree {
        let n_f = n as f64;
        let next = ((2.0 * n_f + 1.0) * x * values[n] - n_f * values[n - 1]) / (n_f + 1.0);
        values.push(next);
    }
    values
}

/// The `num_nodes` Chebyshev-Gauss-Lobatto nodes on `[-1, 1]`, in increasing order.
pub fn chebyshev_lobatto_nodes(num_nodes: usize) -> Vec<f64> {
    assert!(num_nodes >= 2, "Lobatto nodes include both end points");
    let last = (num_nodes - 1) as f64;
    (0..num_nodes)
        .map(|j| -(PI * j as f64 / last).cos())
        .collect()
}

/// Forward and inverse transform matrices for Legendre expansions of the given degree sampled at
/// `num_nodes` Chebyshev-Gauss-Lobatto nodes.
///
/// The inverse matrix has shape `num_nodes x (degree + 1)` with entries `P_n(x_j)`, the forward
/// matrix is its pseudo-inverse. If `num_nodes > degree`, the forward matrix recovers the
/// coefficients of any polynomial of at most the given degree from its samples.
pub fn basis_matrices(degree: usize, num_nodes: usize) -> eyre::Result<(DMatrix<f64>, DMatrix<f64>)> {
    let nodes = chebyshev_lobatto_nodes(num_nodes);
    let mut inverse = DMatrix::zeros(num_nodes, degree + 1);
    for (j, &x) in nodes.iter().enumerate() {
        for (n, p_n) in legendre_polynomials(degree, x).into_iter().enumerate() {
            inverse[(j, n)] = p_n;
        }
    }
    let forward = inverse
        .clone()
        .pseudo_inverse(1e-12)
        .map_err(|err| eyre!("failed to compute forward transform matrix: {err}"))?;
    Ok((forward, inverse))
}

/// Sample positions of a uniform mesh of `[a, b]` with `num_elements` elements and
/// `samples_per_element` Chebyshev-Gauss-Lobatto samples per element.
///
/// Neighboring elements share their interface sample, so the result has
/// `num_elements * (samples_per_element - 1) + 1` entries.
pub fn uniform_mesh_samples(a: f64, b: f64, num_elements: usize, samples_per_element: usize) -> Vec<f64> {
    let nodes = chebyshev_lobatto_nodes(samples_per_element);
    let h = (b - a) / num_elements as f64;
    let mut samples = Vec::with_capacity(num_elements * (samples_per_element - 1) + 1);
    for element in 0..num_elements {
        let x0 = a + h * element as f64;
        let skip = if element == 0 { 0 } else { 1 };
        samples.extend(nodes.iter().skip(skip).map(|xi| x0 + 0.5 * h * (xi + 1.0)));
    }
    if num_elements == 0 {
        samples.push(a);
    }
    samples
}

/// The Gaussian `exp(-x^2 / 4)`.
pub fn gaussian(x: f64) -> f64 {
    (-x * x / 4.0).exp()
}
