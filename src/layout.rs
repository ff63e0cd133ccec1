//! Storage layout of per-element data on a one-dimensional mesh.
//!
//! A mesh of `N` elements with local degree `p` is stored in one of two representations:
//!
//! - *broken*: `N * (p + 1)` entries, element `e` owns the contiguous slice
//!   `[e * (p + 1), (e + 1) * (p + 1))`.
//! - *continuous*: `N * p + 1` entries, element `e` covers `[e * p, (e + 1) * p]`. The first
//!   and last entry of an element are shared with its left and right neighbor, respectively.
//!
//! Nodal samples with `Q` samples per element use the continuous layout with degree `Q - 1`.
use crate::error::{Error, OperationKind, Result};
use nalgebra::{DMatrix, Scalar};
use std::ops::Range;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ElementLayout {
    num_elements: usize,
    degree: usize,
}

impl ElementLayout {
    pub fn new(num_elements: usize, degree: usize) -> Self {
        Self { num_elements, degree }
    }

    /// Determines the layout from the length of a broken vector.
    pub fn from_broken_len(operation: OperationKind, degree: usize, len: usize) -> Result<Self> {
        let block = degree + 1;
        if len % block != 0 {
            return Err(Error::precondition(
                operation,
                format!("broken vector length {len} is not a multiple of degree + 1 = {block}"),
            ));
        }
        Ok(Self::new(len / block, degree))
    }

    /// Determines the layout from the length of a continuous vector.
    ///
    /// Requires `degree >= 1` and at least one element.
    pub fn from_continuous_len(operation: OperationKind, degree: usize, len: usize) -> Result<Self> {
        if degree == 0 {
            return Err(Error::precondition(
                operation,
                "continuous representation requires degree >= 1",
            ));
        }
        if len < degree + 1 || (len - 1) % degree != 0 {
            return Err(Error::precondition(
                operation,
                format!("continuous vector length {len} is not of the form N * {degree} + 1 with N >= 1"),
            ));
        }
        Ok(Self::new((len - 1) / degree, degree))
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn modes_per_element(&self) -> usize {
        self.degree + 1
    }

    pub fn broken_len(&self) -> usize {
        self.num_elements * (self.degree + 1)
    }

    pub fn continuous_len(&self) -> usize {
        self.num_elements * self.degree + 1
    }

    pub fn broken_range(&self, element: usize) -> Range<usize> {
        let block = self.degree + 1;
        element * block..(element + 1) * block
    }

    /// The entries of the continuous vector covered by the element, including both shared ends.
    pub fn continuous_range(&self, element: usize) -> Range<usize> {
        element * self.degree..(element + 1) * self.degree + 1
    }

    pub fn check_broken_len(&self, operation: OperationKind, name: &str, len: usize) -> Result<()> {
        let expected = self.broken_len();
        if len != expected {
            return Err(Error::precondition(
                operation,
                format!(
                    "{name} has length {len}, expected {expected} for {} elements of degree {}",
                    self.num_elements, self.degree
                ),
            ));
        }
        Ok(())
    }

    pub fn check_continuous_len(&self, operation: OperationKind, name: &str, len: usize) -> Result<()> {
        let expected = self.continuous_len();
        if len != expected {
            return Err(Error::precondition(
                operation,
                format!(
                    "{name} has length {len}, expected {expected} for {} elements of degree {}",
                    self.num_elements, self.degree
                ),
            ));
        }
        Ok(())
    }
}

pub(crate) fn check_same_num_columns(operation: OperationKind, input: usize, output: usize) -> Result<()> {
    if input != output {
        return Err(Error::precondition(
            operation,
            format!("input has {input} columns but output has {output} columns"),
        ));
    }
    Ok(())
}

/// The columns of a (column-major) dense matrix as slices.
pub(crate) fn columns<T: Scalar>(matrix: &DMatrix<T>) -> Vec<&[T]> {
    let nrows = matrix.nrows();
    if nrows == 0 {
        return (0..matrix.ncols()).map(|_| &[][..]).collect();
    }
    matrix.as_slice().chunks_exact(nrows).collect()
}

pub(crate) fn columns_mut<T: Scalar>(matrix: &mut DMatrix<T>) -> Vec<&mut [T]> {
    let nrows = matrix.nrows();
    if nrows == 0 {
        return (0..matrix.ncols()).map(|_| &mut [][..]).collect();
    }
    matrix.as_mut_slice().chunks_exact_mut(nrows).collect()
}
