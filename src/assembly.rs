//! Conversion between broken and continuous representations.
//!
//! Converting a continuous vector into broken form is a gather: every element reads its slice of
//! the continuous vector, including the entries it shares with its neighbors, and writes its own
//! broken slice. No coordination is needed.
//!
//! The opposite direction is a scatter with combination. Interior entries of an element are
//! written by the element's worker alone, but an interface entry receives a contribution from
//! both adjacent elements. The [`BoundaryAssembler`] resolves this without locks:
//!
//! - each interface entry is owned by the worker of one of its two elements, selected by the
//!   [`InterfaceOwner`] policy;
//! - interfaces within a worker's block are combined directly by that worker, in element order;
//! - at an interface between two blocks, the non-owning worker leaves its contribution in a
//!   private scratch slot;
//! - after all workers have finished, the calling thread combines the scratch contributions
//!   with the owned values in increasing element order.
//!
//! Every interface is therefore computed as `rule.combine(left, right)` from the same two
//! operands regardless of the partition, which makes the result independent of the number of
//! workers and of the owner policy.
use crate::error::{Error, OperationKind, Result};
use crate::kernel::{fem_to_modal, modal_to_fem, project_modal};
use crate::layout::{check_same_num_columns, columns, columns_mut, ElementLayout};
use crate::partition::{split_columns_mut, InterfaceOwner, Partition};
use crate::pool::{Task, WorkerPool};
use crate::scalar::{real, Scalar};
use itertools::izip;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How the two contributions to an interface entry are combined.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceRule {
    /// The mean of both contributions. Used when both sides hold a value of the same quantity.
    Average,
    /// The sum of both contributions. Used for integrals against basis functions.
    Sum,
}

impl InterfaceRule {
    pub fn combine<T: Scalar>(&self, left: T, right: T) -> T {
        match self {
            Self::Average => (left + right).scale(real::<T>(0.5)),
            Self::Sum => left + right,
        }
    }
}

/// Interface contributions a worker could not write itself.
#[derive(Debug, Copy, Clone)]
struct InterfaceScratch<T> {
    /// Left-vertex contribution of the first element of the block.
    leading: Option<T>,
    /// Right-vertex contribution of the last element of the block.
    trailing: Option<T>,
}

impl<T> Default for InterfaceScratch<T> {
    fn default() -> Self {
        Self {
            leading: None,
            trailing: None,
        }
    }
}

/// Assembles per-element contributions into a continuous vector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundaryAssembler {
    rule: InterfaceRule,
    owner: InterfaceOwner,
}

impl BoundaryAssembler {
    pub fn new(rule: InterfaceRule) -> Self {
        Self {
            rule,
            owner: InterfaceOwner::default(),
        }
    }

    pub fn with_owner(self, owner: InterfaceOwner) -> Self {
        Self { owner, ..self }
    }

    pub fn rule(&self) -> InterfaceRule {
        self.rule
    }

    pub fn owner(&self) -> InterfaceOwner {
        self.owner
    }

    /// Maps every element of a broken vector through `local` and assembles the local results
    /// into a continuous vector.
    ///
    /// `local` receives the element's broken slice and a buffer of the same length for the
    /// element's contributions to the continuous entries `[e * p, (e + 1) * p]`.
    pub fn assemble<T, F>(
        &self,
        operation: OperationKind,
        degree: usize,
        input: &[T],
        output: &mut [T],
        pool: &WorkerPool,
        local: F,
    ) -> Result<()>
    where
        T: Scalar,
        F: Fn(&[T], &mut [T]) + Sync,
    {
        let layout = assembly_layout(operation, degree, input.len(), output.len())?;
        self.assemble_columns(operation, &layout, &[input], &mut [output], pool, local);
        Ok(())
    }

    /// Column-wise [`BoundaryAssembler::assemble`].
    pub fn assemble_matrix<T, F>(
        &self,
        operation: OperationKind,
        degree: usize,
        input: &DMatrix<T>,
        output: &mut DMatrix<T>,
        pool: &WorkerPool,
        local: F,
    ) -> Result<()>
    where
        T: Scalar,
        F: Fn(&[T], &mut [T]) + Sync,
    {
        check_same_num_columns(operation, input.ncols(), output.ncols())?;
        let layout = assembly_layout(operation, degree, input.nrows(), output.nrows())?;
        let mut outputs = columns_mut(output);
        self.assemble_columns(operation, &layout, &columns(input), &mut outputs, pool, local);
        Ok(())
    }

    /// Assembles columns whose lengths have been validated against `layout`.
    fn assemble_columns<T, F>(
        &self,
        operation: OperationKind,
        layout: &ElementLayout,
        inputs: &[&[T]],
        outputs: &mut [&mut [T]],
        pool: &WorkerPool,
        local: F,
    ) where
        T: Scalar,
        F: Fn(&[T], &mut [T]) + Sync,
    {
        if inputs.is_empty() {
            return;
        }
        let layout = *layout;
        let degree = layout.degree();
        let partition = pool.partition(layout.num_elements());
        let spans = partition.node_spans(degree, self.owner);
        let num_columns = inputs.len();
        let mut scratch: Vec<Vec<InterfaceScratch<T>>> = (0..pool.num_workers())
            .map(|_| vec![InterfaceScratch::default(); num_columns])
            .collect();

        let reborrowed = outputs.iter_mut().map(|column| &mut **column);
        let mut task = Task::new(operation, partition.clone());
        for (worker, chunks, span, scratch) in izip!(
            0..,
            split_columns_mut(reborrowed, &spans),
            spans.iter().cloned(),
            scratch.iter_mut()
        ) {
            let assembler = *self;
            let local = &local;
            task.assign(worker, move |ctx| {
                let elements = ctx.elements();
                let buffer = ctx.workspace().element_buffer(degree + 1, T::zero());
                for (input, chunk, scratch) in izip!(inputs, chunks, scratch.iter_mut()) {
                    let block = BlockOutput { span: span.clone(), chunk, scratch };
                    assembler.scatter_block(&layout, elements.clone(), input, block, buffer, local);
                }
            });
        }
        pool.dispatch(task);

        for (output, column) in izip!(outputs.iter_mut(), 0..) {
            self.merge_interfaces(&partition, degree, output, scratch.iter().map(|s| &s[column]));
        }
    }

    /// Writes the contributions of a block of elements to the entries the block owns.
    fn scatter_block<T, F>(
        &self,
        layout: &ElementLayout,
        elements: Range<usize>,
        input: &[T],
        block: BlockOutput<'_, T>,
        buffer: &mut [T],
        local: &F,
    ) where
        T: Scalar,
        F: Fn(&[T], &mut [T]),
    {
        let BlockOutput { span, chunk, scratch } = block;
        let p = layout.degree();
        let n = layout.num_elements();
        let first = elements.start;
        let last = elements.end.saturating_sub(1);
        // Converts a global index of the continuous vector into an index into the chunk
        let at = |global: usize| global - span.start;

        for element in elements {
            local(&input[layout.broken_range(element)], buffer);
            let left = element * p;
            let right = left + p;

            if element > first {
                // Interface inside the block: the left neighbor has already written its value
                chunk[at(left)] = self.rule.combine(chunk[at(left)], buffer[0]);
            } else if first > 0 && self.owner == InterfaceOwner::Left {
                scratch.leading = Some(buffer[0]);
            } else {
                chunk[at(left)] = buffer[0];
            }

            chunk[at(left + 1)..at(right)].copy_from_slice(&buffer[1..p]);

            if element == last && element + 1 < n && self.owner == InterfaceOwner::Right {
                scratch.trailing = Some(buffer[p]);
            } else {
                chunk[at(right)] = buffer[p];
            }
        }
    }

    /// Combines the interfaces between consecutive blocks, in increasing element order.
    fn merge_interfaces<'s, T: Scalar>(
        &self,
        partition: &Partition,
        degree: usize,
        output: &mut [T],
        scratch: impl Iterator<Item = &'s InterfaceScratch<T>>,
    ) {
        let mut trailing = None;
        for (block, scratch) in izip!(partition.blocks(), scratch) {
            if block.is_empty() {
                continue;
            }
            if block.start > 0 {
                let index = block.start * degree;
                let (left, right) = match self.owner {
                    InterfaceOwner::Left => (
                        output[index],
                        scratch
                            .leading
                            .expect("Internal error: leading interface contribution missing"),
                    ),
                    InterfaceOwner::Right => (
                        trailing
                            .take()
                            .expect("Internal error: trailing interface contribution missing"),
                        output[index],
                    ),
                };
                output[index] = self.rule.combine(left, right);
            }
            trailing = scratch.trailing;
        }
    }
}

/// The part of a continuous output column owned by one worker.
struct BlockOutput<'a, T> {
    span: Range<usize>,
    chunk: &'a mut [T],
    scratch: &'a mut InterfaceScratch<T>,
}

/// The layout of a broken input that is assembled into a continuous output.
fn assembly_layout(
    operation: OperationKind,
    degree: usize,
    broken_len: usize,
    continuous_len: usize,
) -> Result<ElementLayout> {
    if degree == 0 {
        return Err(Error::precondition(
            operation,
            "continuous representation requires degree >= 1",
        ));
    }
    let layout = ElementLayout::from_broken_len(operation, degree, broken_len)?;
    if layout.num_elements() == 0 {
        return Err(Error::precondition(
            operation,
            "continuous representation requires at least one element",
        ));
    }
    layout.check_continuous_len(operation, "continuous output", continuous_len)?;
    Ok(layout)
}

/// Converts broken Legendre coefficients into continuous FEM-basis coefficients.
///
/// Interface values are the average of the values of both adjacent elements.
///
/// - `input`: length `N * (p + 1)`.
/// - `output`: length `N * p + 1`.
pub fn parallel_broken_to_continuous<T: Scalar>(
    degree: usize,
    input: &[T],
    output: &mut [T],
    pool: &WorkerPool,
) -> Result<()> {
    BoundaryAssembler::new(InterfaceRule::Average).assemble(
        OperationKind::BrokenToContinuous,
        degree,
        input,
        output,
        pool,
        modal_to_fem,
    )
}

/// Column-wise [`parallel_broken_to_continuous`].
pub fn parallel_broken_to_continuous_matrix<T: Scalar>(
    degree: usize,
    input: &DMatrix<T>,
    output: &mut DMatrix<T>,
    pool: &WorkerPool,
) -> Result<()> {
    BoundaryAssembler::new(InterfaceRule::Average).assemble_matrix(
        OperationKind::BrokenToContinuous,
        degree,
        input,
        output,
        pool,
        modal_to_fem,
    )
}

/// Computes the load vector of $L^2$ inner products of a broken Legendre expansion with the
/// continuous FEM basis on reference elements.
///
/// Interface entries are the sum of the contributions of both adjacent elements.
///
/// - `input`: length `N * (p + 1)`.
/// - `output`: length `N * p + 1`.
pub fn parallel_projection<T: Scalar>(degree: usize, input: &[T], output: &mut [T], pool: &WorkerPool) -> Result<()> {
    BoundaryAssembler::new(InterfaceRule::Sum).assemble(
        OperationKind::Projection,
        degree,
        input,
        output,
        pool,
        project_modal,
    )
}

/// Column-wise [`parallel_projection`].
pub fn parallel_projection_matrix<T: Scalar>(
    degree: usize,
    input: &DMatrix<T>,
    output: &mut DMatrix<T>,
    pool: &WorkerPool,
) -> Result<()> {
    BoundaryAssembler::new(InterfaceRule::Sum).assemble_matrix(
        OperationKind::Projection,
        degree,
        input,
        output,
        pool,
        project_modal,
    )
}

/// Converts continuous FEM-basis coefficients into broken Legendre coefficients.
///
/// - `input`: length `N * p + 1`.
/// - `output`: length `N * (p + 1)`.
pub fn parallel_continuous_to_broken<T: Scalar>(
    degree: usize,
    input: &[T],
    output: &mut [T],
    pool: &WorkerPool,
) -> Result<()> {
    let layout = continuous_to_broken_layout(degree, input.len(), output.len())?;
    continuous_to_broken_columns(&layout, &[input], vec![output], pool);
    Ok(())
}

/// Column-wise [`parallel_continuous_to_broken`].
pub fn parallel_continuous_to_broken_matrix<T: Scalar>(
    degree: usize,
    input: &DMatrix<T>,
    output: &mut DMatrix<T>,
    pool: &WorkerPool,
) -> Result<()> {
    check_same_num_columns(OperationKind::ContinuousToBroken, input.ncols(), output.ncols())?;
    let layout = continuous_to_broken_layout(degree, input.nrows(), output.nrows())?;
    continuous_to_broken_columns(&layout, &columns(input), columns_mut(output), pool);
    Ok(())
}

fn continuous_to_broken_layout(degree: usize, continuous_len: usize, broken_len: usize) -> Result<ElementLayout> {
    let operation = OperationKind::ContinuousToBroken;
    let layout = ElementLayout::from_continuous_len(operation, degree, continuous_len)?;
    layout.check_broken_len(operation, "broken output", broken_len)?;
    Ok(layout)
}

fn continuous_to_broken_columns<T: Scalar>(
    layout: &ElementLayout,
    inputs: &[&[T]],
    outputs: Vec<&mut [T]>,
    pool: &WorkerPool,
) {
    if inputs.is_empty() {
        return;
    }
    let layout = *layout;
    let operation = OperationKind::ContinuousToBroken;
    let partition = pool.partition(layout.num_elements());
    let spans = partition.broken_spans(layout.modes_per_element());
    let mut task = Task::new(operation, partition);
    for (worker, chunks) in split_columns_mut(outputs, &spans).into_iter().enumerate() {
        task.assign(worker, move |ctx| {
            let elements = ctx.elements();
            for (input, chunk) in izip!(inputs, chunks) {
                let modes = layout.modes_per_element();
                for (element, modal) in elements.clone().zip(chunk.chunks_exact_mut(modes)) {
                    fem_to_modal(&input[layout.continuous_range(element)], modal);
                }
            }
        });
    }
    pool.dispatch(task);
}
