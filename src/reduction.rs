//! Global reductions over broken vectors.
//!
//! Every worker accumulates the contributions of its block in element order into a private
//! partial sum. The partial sums are combined on the calling thread in increasing worker order.
//! Because the partition depends only on the number of elements and workers, repeated reductions
//! of the same data on the same pool are bit-identical.
use crate::error::{OperationKind, Result};
use crate::kernel::element_norm_squared;
use crate::layout::{columns, ElementLayout};
use crate::pool::{Task, WorkerPool};
use crate::scalar::Scalar;
use itertools::izip;
use log::trace;
use nalgebra::{ComplexField, DMatrix, DVector};

/// Computes the $L^2$ norm of a broken Legendre expansion over reference elements.
///
/// The result is $\sqrt{\sum_e \sum_n |c_{e, n}|^2 \frac{2}{2n + 1}}$. An empty input has norm
/// zero.
///
/// - `input`: length `num_elements * (degree + 1)`.
pub fn parallel_norm<T: Scalar>(
    degree: usize,
    num_elements: usize,
    input: &[T],
    pool: &WorkerPool,
) -> Result<T::RealField> {
    let squared = squared_norm_columns(degree, num_elements, &[input], pool)?;
    Ok(squared[0].sqrt())
}

/// Column-wise [`parallel_norm`] of a matrix with one time step per column.
pub fn parallel_norm_matrix<T: Scalar>(
    degree: usize,
    num_elements: usize,
    input: &DMatrix<T>,
    pool: &WorkerPool,
) -> Result<DVector<T::RealField>> {
    let squared = squared_norm_columns(degree, num_elements, &columns(input), pool)?;
    Ok(DVector::from_iterator(
        squared.len(),
        squared.into_iter().map(|s| s.sqrt()),
    ))
}

/// Sums per-worker partial sums in increasing worker order.
pub fn combine_partial_sums<R: crate::Real>(partials: &[R]) -> R {
    partials.iter().fold(R::zero(), |acc, &partial| acc + partial)
}

/// Squared norms of every column.
fn squared_norm_columns<T: Scalar>(
    degree: usize,
    num_elements: usize,
    inputs: &[&[T]],
    pool: &WorkerPool,
) -> Result<Vec<T::RealField>> {
    let operation = OperationKind::Norm;
    let layout = ElementLayout::new(num_elements, degree);
    for input in inputs {
        layout.check_broken_len(operation, "broken input", input.len())?;
    }

    let num_columns = inputs.len();
    let mut partials = vec![vec![nalgebra::zero::<T::RealField>(); num_columns]; pool.num_workers()];
    let partition = pool.partition(num_elements);
    let mut task = Task::new(operation, partition);
    for (worker, partial) in izip!(0.., partials.iter_mut()) {
        task.assign(worker, move |ctx| {
            let elements = ctx.elements();
            for (input, acc) in izip!(inputs, partial.iter_mut()) {
                for element in elements.clone() {
                    *acc += element_norm_squared(&input[layout.broken_range(element)]);
                }
            }
        });
    }
    pool.dispatch(task);

    let squared = (0..num_columns)
        .map(|column| {
            let column_partials: Vec<_> = partials.iter().map(|partial| partial[column]).collect();
            combine_partial_sums(&column_partials)
        })
        .collect();
    trace!("Combined partial sums of {num_columns} columns from {} workers", partials.len());
    Ok(squared)
}
