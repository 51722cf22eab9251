//! Dense solve of the projected (Rayleigh–Ritz) eigenproblem and target
//! ordering of the resulting Ritz values.

use crate::config::Target;
use crate::error::EigenError;
use faer::{Mat, MatRef, Side};

/// Eigendecomposition of the small symmetric projected matrix.
///
/// Returns eigenvalues and eigenvectors in the backend's native order;
/// callers apply [`order_indices`] on top.
pub fn solve_projected(h: MatRef<'_, f64>) -> Result<(Vec<f64>, Mat<f64>), EigenError> {
    let k = h.nrows();
    debug_assert_eq!(k, h.ncols());
    let eig = h
        .self_adjoint_eigen(Side::Lower)
        .map_err(|e| EigenError::ProjectedSolve(format!("{e:?}")))?;
    let s = eig.S();
    let u = eig.U();
    let values = (0..k).map(|i| s[i]).collect::<Vec<_>>();
    let vectors = Mat::from_fn(k, k, |i, j| u[(i, j)]);
    Ok((values, vectors))
}

/// Indices of `values` sorted by closeness to the target. Values within
/// `tie_tol` of each other are ordered by residual norm (smaller first) when
/// residual norms are known.
pub fn order_indices(
    values: &[f64],
    target: &Target,
    tie_tol: f64,
    rnorms: Option<&[f64]>,
) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| {
        let da = target.distance(values[a]);
        let db = target.distance(values[b]);
        if (da - db).abs() <= tie_tol {
            if let Some(rn) = rnorms {
                if let Some(ord) = rn[a].partial_cmp(&rn[b]) {
                    return ord;
                }
            }
        }
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    idx
}
