//! Parallel forward and inverse Legendre transforms.
//!
//! The forward transform maps nodal samples of a function to the Legendre coefficients of every
//! element, the inverse transform maps Legendre coefficients back to nodal samples. With `Q`
//! samples per element, nodal vectors use the continuous layout with degree `Q - 1`: the last
//! sample of an element is the first sample of its right neighbor.
//!
//! The forward transform only reads shared samples and is partitioned by element without any
//! coordination. The inverse transform writes shared samples; since a sequential sweep over the
//! elements leaves the value computed by the right element in a shared sample, each shared sample
//! is owned by the worker of the element to its right, and the left element skips it.
use crate::error::{Error, OperationKind, Result};
use crate::kernel::apply_element;
use crate::layout::{check_same_num_columns, columns, columns_mut, ElementLayout};
use crate::partition::{split_columns_mut, InterfaceOwner};
use crate::pool::{Task, WorkerPool};
use crate::scalar::Scalar;
use itertools::izip;
use nalgebra::DMatrix;

/// Layouts of the nodal and the modal side of a transform.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct TransformLayouts {
    pub nodal: ElementLayout,
    pub modal: ElementLayout,
}

impl TransformLayouts {
    /// Layouts for a forward matrix of shape `modes x samples`.
    pub fn forward<R>(num_elements: usize, forward: &DMatrix<R>) -> Result<Self>
    where
        R: nalgebra::Scalar,
    {
        Self::from_shape(OperationKind::ForwardTransform, num_elements, forward.ncols(), forward.nrows())
    }

    /// Layouts for an inverse matrix of shape `samples x modes`.
    pub fn inverse<R>(num_elements: usize, inverse: &DMatrix<R>) -> Result<Self>
    where
        R: nalgebra::Scalar,
    {
        Self::from_shape(OperationKind::InverseTransform, num_elements, inverse.nrows(), inverse.ncols())
    }

    fn from_shape(operation: OperationKind, num_elements: usize, samples: usize, modes: usize) -> Result<Self> {
        if samples < 2 {
            return Err(Error::precondition(
                operation,
                format!("transform needs at least 2 samples per element, got {samples}"),
            ));
        }
        if modes == 0 {
            return Err(Error::precondition(operation, "transform needs at least one mode per element"));
        }
        Ok(Self {
            nodal: ElementLayout::new(num_elements, samples - 1),
            modal: ElementLayout::new(num_elements, modes - 1),
        })
    }
}

/// Computes the Legendre coefficients of every element from nodal samples.
///
/// - `forward`: the `(p + 1) x Q` forward matrix.
/// - `input`: nodal samples, of length `N * (Q - 1) + 1`.
/// - `output`: broken Legendre coefficients, of length `N * (p + 1)`.
pub fn parallel_forward_transform<T: Scalar>(
    num_elements: usize,
    forward: &DMatrix<T::RealField>,
    input: &[T],
    output: &mut [T],
    pool: &WorkerPool,
) -> Result<()> {
    let layouts = forward_layouts(num_elements, forward, input.len(), output.len())?;
    forward_columns(&layouts, forward, &[input], vec![output], pool);
    Ok(())
}

/// Column-wise [`parallel_forward_transform`] of a matrix with one time step per column.
pub fn parallel_forward_transform_matrix<T: Scalar>(
    num_elements: usize,
    forward: &DMatrix<T::RealField>,
    input: &DMatrix<T>,
    output: &mut DMatrix<T>,
    pool: &WorkerPool,
) -> Result<()> {
    check_same_num_columns(OperationKind::ForwardTransform, input.ncols(), output.ncols())?;
    let layouts = forward_layouts(num_elements, forward, input.nrows(), output.nrows())?;
    forward_columns(&layouts, forward, &columns(input), columns_mut(output), pool);
    Ok(())
}

/// Computes nodal samples of every element from its Legendre coefficients.
///
/// - `inverse`: the `Q x (p + 1)` inverse matrix.
/// - `input`: broken Legendre coefficients, of length `N * (p + 1)`.
/// - `output`: nodal samples, of length `N * (Q - 1) + 1`. A sample shared by two elements
///   takes the value of the right element.
pub fn parallel_inverse_transform<T: Scalar>(
    num_elements: usize,
    inverse: &DMatrix<T::RealField>,
    input: &[T],
    output: &mut [T],
    pool: &WorkerPool,
) -> Result<()> {
    let layouts = inverse_layouts(num_elements, inverse, input.len(), output.len())?;
    inverse_columns(&layouts, inverse, &[input], vec![output], pool);
    Ok(())
}

/// Column-wise [`parallel_inverse_transform`] of a matrix with one time step per column.
pub fn parallel_inverse_transform_matrix<T: Scalar>(
    num_elements: usize,
    inverse: &DMatrix<T::RealField>,
    input: &DMatrix<T>,
    output: &mut DMatrix<T>,
    pool: &WorkerPool,
) -> Result<()> {
    check_same_num_columns(OperationKind::InverseTransform, input.ncols(), output.ncols())?;
    let layouts = inverse_layouts(num_elements, inverse, input.nrows(), output.nrows())?;
    inverse_columns(&layouts, inverse, &columns(input), columns_mut(output), pool);
    Ok(())
}

/// Validates a forward transform of `input_len` nodal samples into `output_len` coefficients.
pub(crate) fn forward_layouts<R>(
    num_elements: usize,
    forward: &DMatrix<R>,
    input_len: usize,
    output_len: usize,
) -> Result<TransformLayouts>
where
    R: nalgebra::Scalar,
{
    let operation = OperationKind::ForwardTransform;
    let layouts = TransformLayouts::forward(num_elements, forward)?;
    layouts.nodal.check_continuous_len(operation, "nodal input", input_len)?;
    layouts.modal.check_broken_len(operation, "modal output", output_len)?;
    Ok(layouts)
}

/// Validates an inverse transform of `input_len` coefficients into `output_len` nodal samples.
pub(crate) fn inverse_layouts<R>(
    num_elements: usize,
    inverse: &DMatrix<R>,
    input_len: usize,
    output_len: usize,
) -> Result<TransformLayouts>
where
    R: nalgebra::Scalar,
{
    let operation = OperationKind::InverseTransform;
    if num_elements == 0 {
        return Err(Error::precondition(operation, "nodal output requires at least one element"));
    }
    let layouts = TransformLayouts::inverse(num_elements, inverse)?;
    layouts.modal.check_broken_len(operation, "modal input", input_len)?;
    layouts.nodal.check_continuous_len(operation, "nodal output", output_len)?;
    Ok(layouts)
}

fn forward_columns<T: Scalar>(
    layouts: &TransformLayouts,
    forward: &DMatrix<T::RealField>,
    inputs: &[&[T]],
    outputs: Vec<&mut [T]>,
    pool: &WorkerPool,
) {
    if inputs.is_empty() {
        return;
    }
    let layouts = *layouts;
    let partition = pool.partition(layouts.modal.num_elements());
    let spans = partition.broken_spans(layouts.modal.modes_per_element());
    let mut task = Task::new(OperationKind::ForwardTransform, partition);
    for (worker, chunks) in split_columns_mut(outputs, &spans).into_iter().enumerate() {
        task.assign(worker, move |ctx| {
            let elements = ctx.elements();
            let modes = layouts.modal.modes_per_element();
            for (input, chunk) in izip!(inputs, chunks) {
                for (element, modal) in elements.clone().zip(chunk.chunks_exact_mut(modes)) {
                    let nodal = &input[layouts.nodal.continuous_range(element)];
                    apply_element(forward, nodal, modal);
                }
            }
        });
    }
    pool.dispatch(task);
}

fn inverse_columns<T: Scalar>(
    layouts: &TransformLayouts,
    inverse: &DMatrix<T::RealField>,
    inputs: &[&[T]],
    outputs: Vec<&mut [T]>,
    pool: &WorkerPool,
) {
    if inputs.is_empty() {
        return;
    }
    let layouts = *layouts;
    let num_elements = layouts.nodal.num_elements();
    let partition = pool.partition(num_elements);
    let spans = partition.node_spans(layouts.nodal.degree(), InterfaceOwner::Right);
    let mut task = Task::new(OperationKind::InverseTransform, partition);
    for (worker, chunks, span) in izip!(0.., split_columns_mut(outputs, &spans), spans.clone()) {
        task.assign(worker, move |ctx| {
            let stride = layouts.nodal.degree();
            for (input, chunk) in izip!(inputs, chunks) {
                for element in ctx.elements() {
                    let modal = &input[layouts.modal.broken_range(element)];
                    // The last sample of an element belongs to its right neighbor, if any
                    let num_samples = if element + 1 == num_elements { stride + 1 } else { stride };
                    let start = element * stride - span.start;
                    apply_element(inverse, modal, &mut chunk[start..start + num_samples]);
                }
            }
        });
    }
    pool.dispatch(task);
}
