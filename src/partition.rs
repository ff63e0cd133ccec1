//! Partitioning of mesh elements into contiguous per-worker blocks.
//!
//! Workers of a [`WorkerPool`](crate::pool::WorkerPool) write their results directly into the
//! caller's output buffers. This is only sound because every output entry is owned by exactly one
//! block of a [`Partition`]: the functions in this module compute, for a given partition, the
//! span of entries each block owns, and split an output buffer into the corresponding disjoint
//! mutable slices.
use serde::{Deserialize, Serialize};
use std::mem;
use std::ops::Range;

/// A split of the element range `[0, N)` into contiguous, disjoint and exhaustive blocks.
///
/// Block `i` is processed by worker `i` of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    num_elements: usize,
    blocks: Vec<Range<usize>>,
}

impl Partition {
    /// Splits `num_elements` elements into `num_blocks` blocks of nearly equal size.
    ///
    /// Every block receives `num_elements / num_blocks` elements, and the first
    /// `num_elements % num_blocks` blocks receive one additional element. Block sizes therefore
    /// differ by at most one and never increase with the block index. When there are fewer
    /// elements than blocks, the trailing blocks are empty.
    ///
    /// # Panics
    ///
    /// Panics if `num_blocks` is zero.
    pub fn even(num_elements: usize, num_blocks: usize) -> Self {
        assert!(num_blocks > 0, "A partition must have at least one block");
        let base = num_elements / num_blocks;
        let remainder = num_elements % num_blocks;

        let mut blocks = Vec::with_capacity(num_blocks);
        let mut start = 0;
        for i in 0..num_blocks {
            let len = if i < remainder { base + 1 } else { base };
            blocks.push(start..start + len);
            start += len;
        }

        let partition = Self { num_elements, blocks };
        debug_assert!(partition.is_valid());
        partition
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[Range<usize>] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Range<usize> {
        self.blocks[index].clone()
    }

    /// Checks that the blocks are contiguous and cover `[0, N)` exactly once.
    pub fn is_valid(&self) -> bool {
        let mut next = 0;
        for block in &self.blocks {
            if block.start != next || block.end < block.start {
                return false;
            }
            next = block.end;
        }
        next == self.num_elements
    }

    /// Spans of a broken vector (or any vector storing `block_len` entries per element) owned by
    /// each block.
    pub fn broken_spans(&self, block_len: usize) -> Vec<Range<usize>> {
        self.blocks
            .iter()
            .map(|block| block.start * block_len..block.end * block_len)
            .collect()
    }

    /// Spans of a continuous vector of length `N * degree + 1` owned by each block.
    ///
    /// Interior entries of an element always belong to the block of that element. An interface
    /// entry shared by elements `e - 1` and `e` belongs to the block of the element selected by
    /// `owner`, while the two domain ends belong to the first and last element. The returned
    /// spans are contiguous and together cover the whole continuous vector.
    ///
    /// # Panics
    ///
    /// Panics if the partition has no elements or if `degree` is zero.
    pub fn node_spans(&self, degree: usize, owner: InterfaceOwner) -> Vec<Range<usize>> {
        assert!(degree > 0, "Continuous vectors require degree >= 1");
        assert!(self.num_elements > 0, "Continuous vectors require at least one element");
        let n = self.num_elements;

        // Position of the first entry owned by the block starting at element `e`
        let boundary = |e: usize| match owner {
            InterfaceOwner::Left if e == 0 => 0,
            InterfaceOwner::Left => e * degree + 1,
            InterfaceOwner::Right if e == n => n * degree + 1,
            InterfaceOwner::Right => e * degree,
        };

        self.blocks
            .iter()
            .map(|block| boundary(block.start)..boundary(block.end))
            .collect()
    }
}

/// The element whose worker writes a value shared by two neighboring elements.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceOwner {
    /// The element to the left of the interface.
    #[default]
    Left,
    /// The element to the right of the interface.
    Right,
}

/// Splits a slice into disjoint mutable pieces, one per span.
///
/// # Panics
///
/// Panics if the spans are not contiguous, do not start at zero or do not cover the whole slice.
pub fn split_spans_mut<'a, T>(slice: &'a mut [T], spans: &[Range<usize>]) -> Vec<&'a mut [T]> {
    let total = slice.len();
    let mut rest = slice;
    let mut offset = 0;
    let mut pieces = Vec::with_capacity(spans.len());
    for span in spans {
        assert_eq!(span.start, offset, "Spans must be contiguous and start at zero");
        assert!(span.end >= span.start, "Spans must not be reversed");
        assert!(span.end <= total, "Span {span:?} exceeds slice of length {total}");
        let (piece, tail) = mem::take(&mut rest).split_at_mut(span.len());
        pieces.push(piece);
        rest = tail;
        offset = span.end;
    }
    assert!(rest.is_empty(), "Spans must cover the whole slice");
    pieces
}

/// Splits every column into disjoint pieces and groups the pieces by span.
///
/// The result has one entry per span, holding that span's piece of every column in order.
pub fn split_columns_mut<'a, T>(
    columns: impl IntoIterator<Item = &'a mut [T]>,
    spans: &[Range<usize>],
) -> Vec<Vec<&'a mut [T]>> {
    let mut grouped: Vec<Vec<&'a mut [T]>> = (0..spans.len()).map(|_| Vec::new()).collect();
    for column in columns {
        for (group, piece) in grouped.iter_mut().zip(split_spans_mut(column, spans)) {
            group.push(piece);
        }
    }
    grouped
}
