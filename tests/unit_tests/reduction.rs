use super::{complex_data, pool, real_data, WORKER_COUNTS};
use matrixcompare::assert_scalar_eq;
use nalgebra::{Complex, DMatrix};
use pfem1d::reduction::{combine_partial_sums, parallel_norm, parallel_norm_matrix};
use pfem1d::{serial, Error, OperationKind};

#[test]
fn norm_of_constant() {
    // Every element has squared norm 2
    let (degree, num_elements) = (3, 8);
    let mut broken = vec![0.0; num_elements * (degree + 1)];
    for element in 0..num_elements {
        broken[element * (degree + 1)] = 1.0;
    }
    let pool = pool(3);
    let norm: f64 = parallel_norm(degree, num_elements, &broken, &pool).unwrap();
    assert_scalar_eq!(norm, 4.0, comp = abs, tol = 1e-14);
}

#[test]
fn norm_of_complex_expansion() {
    let input = [Complex::new(0.0, 1.0), Complex::new(0.0, 0.0)];
    let pool = pool(2);
    let norm = parallel_norm(1, 1, &input, &pool).unwrap();
    assert_scalar_eq!(norm, 2.0_f64.sqrt(), comp = abs, tol = 1e-14);
}

#[test]
fn norm_of_empty_mesh_is_zero() {
    let pool = pool(4);
    assert_eq!(parallel_norm::<f64>(2, 0, &[], &pool).unwrap(), 0.0);
}

#[test]
fn norm_matches_serial_for_all_worker_counts() {
    let (degree, num_elements) = (2, 200);
    let real = real_data(num_elements * (degree + 1));
    let complex = complex_data(num_elements * (degree + 1));
    let expected_real = serial::norm(degree, num_elements, &real).unwrap();
    let expected_complex = serial::norm(degree, num_elements, &complex).unwrap();

    for num_workers in WORKER_COUNTS {
        let pool = pool(num_workers);
        let norm = parallel_norm(degree, num_elements, &real, &pool).unwrap();
        assert!(((norm - expected_real) / expected_real).abs() < 1e-9);

        let norm = parallel_norm(degree, num_elements, &complex, &pool).unwrap();
        assert!(((norm - expected_complex) / expected_complex).abs() < 1e-9);
    }
}

#[test]
fn repeated_norms_are_bit_identical() {
    let (degree, num_elements) = (4, 97);
    let input = real_data(num_elements * (degree + 1));
    let pool = pool(6);
    let first = parallel_norm(degree, num_elements, &input, &pool).unwrap();
    for _ in 0..20 {
        let norm = parallel_norm(degree, num_elements, &input, &pool).unwrap();
        assert_eq!(norm.to_bits(), first.to_bits());
    }
}

#[test]
fn single_worker_norm_equals_serial_norm() {
    let (degree, num_elements) = (3, 50);
    let input = real_data(num_elements * (degree + 1));
    let pool = pool(1);
    let norm = parallel_norm(degree, num_elements, &input, &pool).unwrap();
    assert_eq!(norm, serial::norm(degree, num_elements, &input).unwrap());
}

#[test]
fn norm_matrix_computes_norm_per_column() {
    let (degree, num_elements, num_columns) = (2, 13, 3);
    let rows = num_elements * (degree + 1);
    let input = DMatrix::from_column_slice(rows, num_columns, &real_data(rows * num_columns));
    let pool = pool(4);
    let norms = parallel_norm_matrix(degree, num_elements, &input, &pool).unwrap();
    assert_eq!(norms.len(), num_columns);

    for column in 0..num_columns {
        let values: Vec<f64> = input.column(column).iter().copied().collect();
        let expected = parallel_norm(degree, num_elements, &values, &pool).unwrap();
        assert_eq!(norms[column], expected);
    }
}

#[test]
fn norm_rejects_wrong_length() {
    let pool = pool(2);
    let err = parallel_norm(2, 4, &[1.0; 11], &pool).unwrap_err();
    assert!(matches!(
        err,
        Error::PreconditionViolation {
            operation: OperationKind::Norm,
            ..
        }
    ));
    assert!(serial::norm(2, 4, &[1.0; 13]).is_err());
}

#[test]
fn partial_sums_are_combined_in_order() {
    assert_eq!(combine_partial_sums(&[1.0, 2.0, 3.5]), 6.5);
    assert_eq!(combine_partial_sums::<f64>(&[]), 0.0);
    // Summation order is observable in floating point: ((1e16 + 1) + 1) loses both ones
    assert_eq!(combine_partial_sums(&[1e16, 1.0, 1.0]), 1e16);
}
