//! Block orthogonalization.
//!
//! Classical Gram–Schmidt with a second refinement pass (CGS2): each pass
//! batches all projection coefficients into one global reduction, so every
//! process applies identical updates. Directions whose norm collapses under
//! projection are rejected rather than inserted; the caller decides how to
//! recover from an empty block.

use crate::parallel::Comm;
use faer::{Mat, MatRef};

use super::{col_norm, local_col_dot};

/// Result of orthonormalizing one candidate block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrthoOutcome {
    /// Columns kept, packed to the left of the block.
    pub accepted: usize,
    /// Columns dropped as numerically dependent.
    pub rejected: usize,
}

/// Orthonormalize `block[.., ..ncols]` against the locked vectors, the basis,
/// and the already-accepted block columns. Accepted columns end up packed
/// left and unit-normalized; a column is rejected when two projection passes
/// shrink its norm below `rel_tol` times the original.
pub fn orthonormalize_block<C: Comm>(
    comm: &C,
    locked: MatRef<'_, f64>,
    basis: MatRef<'_, f64>,
    block: &mut Mat<f64>,
    ncols: usize,
    rel_tol: f64,
) -> OrthoOutcome {
    let n = block.nrows();
    let mut accepted = 0usize;
    for j in 0..ncols {
        if j != accepted {
            for i in 0..n {
                block[(i, accepted)] = block[(i, j)];
            }
        }
        let norm0 = col_norm(comm, block.as_ref(), accepted);
        if !(norm0 > 0.0) || !norm0.is_finite() {
            continue;
        }
        for _pass in 0..2 {
            project_out(comm, locked, basis, block, accepted);
        }
        let norm1 = col_norm(comm, block.as_ref(), accepted);
        if norm1 <= rel_tol * norm0 || !norm1.is_finite() {
            continue;
        }
        let inv = 1.0 / norm1;
        for i in 0..n {
            block[(i, accepted)] *= inv;
        }
        accepted += 1;
    }
    OrthoOutcome { accepted, rejected: ncols - accepted }
}

/// One projection pass of column `col` of `block` against locked, basis and
/// earlier block columns, with a single batched reduction for the
/// coefficients.
fn project_out<C: Comm>(
    comm: &C,
    locked: MatRef<'_, f64>,
    basis: MatRef<'_, f64>,
    block: &mut Mat<f64>,
    col: usize,
) {
    let n = block.nrows();
    let l = locked.ncols();
    let m = basis.ncols();
    let mut coeffs = Vec::with_capacity(l + m + col);
    for q in 0..l {
        coeffs.push(local_col_dot(block.as_ref(), col, locked, q));
    }
    for q in 0..m {
        coeffs.push(local_col_dot(block.as_ref(), col, basis, q));
    }
    for q in 0..col {
        coeffs.push(local_col_dot(block.as_ref(), col, block.as_ref(), q));
    }
    comm.all_reduce_slice(&mut coeffs);
    for i in 0..n {
        let mut v = block[(i, col)];
        for q in 0..l {
            v -= coeffs[q] * locked[(i, q)];
        }
        for q in 0..m {
            v -= coeffs[l + q] * basis[(i, q)];
        }
        for q in 0..col {
            v -= coeffs[l + m + q] * block[(i, q)];
        }
        block[(i, col)] = v;
    }
}

/// Orthonormalize column `col` of `v` against columns `0..m` of `v`, applying
/// the identical elimination to column `col` of `w`. Used to carry retained
/// Ritz vectors (and their operator images) through a restart without new
/// operator applications. Returns `false` when the column is numerically
/// dependent.
pub fn orthonormalize_tracked<C: Comm>(
    comm: &C,
    v: &mut Mat<f64>,
    w: &mut Mat<f64>,
    m: usize,
    col: usize,
    rel_tol: f64,
) -> bool {
    let n = v.nrows();
    let norm0 = col_norm(comm, v.as_ref(), col);
    if !(norm0 > 0.0) || !norm0.is_finite() {
        return false;
    }
    for _pass in 0..2 {
        let mut coeffs = Vec::with_capacity(m);
        for q in 0..m {
            coeffs.push(local_col_dot(v.as_ref(), col, v.as_ref(), q));
        }
        comm.all_reduce_slice(&mut coeffs);
        for i in 0..n {
            let mut vi = v[(i, col)];
            let mut wi = w[(i, col)];
            for q in 0..m {
                vi -= coeffs[q] * v[(i, q)];
                wi -= coeffs[q] * w[(i, q)];
            }
            v[(i, col)] = vi;
            w[(i, col)] = wi;
        }
    }
    let norm1 = col_norm(comm, v.as_ref(), col);
    if norm1 <= rel_tol * norm0 || !norm1.is_finite() {
        return false;
    }
    let inv = 1.0 / norm1;
    for i in 0..n {
        v[(i, col)] *= inv;
        w[(i, col)] *= inv;
    }
    true
}
