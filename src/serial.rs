//! Single-threaded reference implementations of the parallel operations.
//!
//! The functions in this module validate their arguments exactly like their parallel
//! counterparts and apply the same element kernels in the same order. Apart from the norm, whose
//! partial sums are grouped differently, they produce bit-identical results.
use crate::assembly::InterfaceRule;
use crate::error::{Error, OperationKind, Result};
use crate::kernel::{apply_element, element_norm_squared, fem_to_modal, modal_to_fem, project_modal};
use crate::layout::ElementLayout;
use crate::scalar::Scalar;
use crate::transform::{forward_layouts, inverse_layouts};
use nalgebra::{ComplexField, DMatrix};

/// Serial [`parallel_forward_transform`](crate::transform::parallel_forward_transform).
pub fn forward_transform<T: Scalar>(
    num_elements: usize,
    forward: &DMatrix<T::RealField>,
    input: &[T],
    output: &mut [T],
) -> Result<()> {
    let layouts = forward_layouts(num_elements, forward, input.len(), output.len())?;

    for element in 0..num_elements {
        let nodal = &input[layouts.nodal.continuous_range(element)];
        apply_element(forward, nodal, &mut output[layouts.modal.broken_range(element)]);
    }
    Ok(())
}

/// Serial [`parallel_inverse_transform`](crate::transform::parallel_inverse_transform).
///
/// Elements are processed in order and every element writes all of its samples, so a shared
/// sample ends up with the value of the right element.
pub fn inverse_transform<T: Scalar>(
    num_elements: usize,
    inverse: &DMatrix<T::RealField>,
    input: &[T],
    output: &mut [T],
) -> Result<()> {
    let layouts = inverse_layouts(num_elements, inverse, input.len(), output.len())?;

    for element in 0..num_elements {
        let modal = &input[layouts.modal.broken_range(element)];
        apply_element(inverse, modal, &mut output[layouts.nodal.continuous_range(element)]);
    }
    Ok(())
}

/// Serial [`parallel_broken_to_continuous`](crate::assembly::parallel_broken_to_continuous).
pub fn broken_to_continuous<T: Scalar>(degree: usize, input: &[T], output: &mut [T]) -> Result<()> {
    assemble(
        OperationKind::BrokenToContinuous,
        InterfaceRule::Average,
        degree,
        input,
        output,
        modal_to_fem,
    )
}

/// Serial [`parallel_projection`](crate::assembly::parallel_projection).
pub fn projection<T: Scalar>(degree: usize, input: &[T], output: &mut [T]) -> Result<()> {
    assemble(OperationKind::Projection, InterfaceRule::Sum, degree, input, output, project_modal)
}

/// Serial [`parallel_continuous_to_broken`](crate::assembly::parallel_continuous_to_broken).
pub fn continuous_to_broken<T: Scalar>(degree: usize, input: &[T], output: &mut [T]) -> Result<()> {
    let operation = OperationKind::ContinuousToBroken;
    let layout = ElementLayout::from_continuous_len(operation, degree, input.len())?;
    layout.check_broken_len(operation, "broken output", output.len())?;

    for element in 0..layout.num_elements() {
        fem_to_modal(
            &input[layout.continuous_range(element)],
            &mut output[layout.broken_range(element)],
        );
    }
    Ok(())
}

/// Serial [`parallel_norm`](crate::reduction::parallel_norm).
pub fn norm<T: Scalar>(degree: usize, num_elements: usize, input: &[T]) -> Result<T::RealField> {
    let layout = ElementLayout::new(num_elements, degree);
    layout.check_broken_len(OperationKind::Norm, "broken input", input.len())?;

    let mut acc = nalgebra::zero::<T::RealField>();
    for element in 0..num_elements {
        acc += element_norm_squared(&input[layout.broken_range(element)]);
    }
    Ok(acc.sqrt())
}

fn assemble<T, F>(
    operation: OperationKind,
    rule: InterfaceRule,
    degree: usize,
    input: &[T],
    output: &mut [T],
    local: F,
) -> Result<()>
where
    T: Scalar,
    F: Fn(&[T], &mut [T]),
{
    if degree == 0 {
        return Err(Error::precondition(
            operation,
            "continuous representation requires degree >= 1",
        ));
    }
    let layout = ElementLayout::from_broken_len(operation, degree, input.len())?;
    if layout.num_elements() == 0 {
        return Err(Error::precondition(
            operation,
            "continuous representation requires at least one element",
        ));
    }
    layout.check_continuous_len(operation, "continuous output", output.len())?;

    let mut buffer = vec![T::zero(); degree + 1];
    for element in 0..layout.num_elements() {
        local(&input[layout.broken_range(element)], &mut buffer);
        let range = layout.continuous_range(element);
        let target = &mut output[range];
        target[0] = if element > 0 {
            rule.combine(target[0], buffer[0])
        } else {
            buffer[0]
        };
        target[1..].copy_from_slice(&buffer[1..]);
    }
    Ok(())
}
