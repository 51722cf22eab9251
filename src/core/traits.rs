//! Core operator traits for krydav.
//!
//! The engine only ever touches the problem matrix through [`BlockOperator`],
//! a block-shaped matrix-apply capability. Blocks are passed as `faer` views,
//! which carry their own strides, so callers may hand out columns of a larger
//! buffer without copying (the leading-dimension contract of the usual
//! callback interfaces).

use faer::{MatMut, MatRef};

/// Nonzero status code reported by a caller-supplied callback.
///
/// The engine never interprets the code; it aborts the run and hands the code
/// back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyErr(pub i32);

/// Block matrix–vector product: Y ← A X, one call per block of columns.
///
/// The block granularity is a first-class performance knob: the engine batches
/// as many columns per call as its current block size allows, so that an
/// internally parallel (threaded or distributed) operator can fan out across
/// the block.
pub trait BlockOperator {
    /// Row dimension of the operator (local rows in a distributed setting).
    fn nrows(&self) -> usize;

    /// Compute `y = A · x` for every column of `x`.
    ///
    /// `x` and `y` have the same number of columns; `y` must be fully
    /// overwritten. Returning `Err` aborts the run.
    fn apply_block(&self, x: MatRef<'_, f64>, y: MatMut<'_, f64>) -> Result<(), ApplyErr>;
}
