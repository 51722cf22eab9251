//! Basis algebra kernels: reductions, orthogonalization and the projected
//! dense eigensolve. Leaf utilities used by the subspace manager and the
//! correction solver.

pub mod ortho;
pub mod projected;

use crate::parallel::Comm;
use faer::MatRef;

/// Local (per-process) dot product of two matrix columns.
pub(crate) fn local_col_dot(a: MatRef<'_, f64>, ja: usize, b: MatRef<'_, f64>, jb: usize) -> f64 {
    let n = a.nrows();
    debug_assert_eq!(n, b.nrows());
    #[cfg(feature = "rayon")]
    if n >= 4096 {
        use rayon::prelude::*;
        return (0..n).into_par_iter().map(|i| a[(i, ja)] * b[(i, jb)]).sum();
    }
    let mut s = 0.0;
    for i in 0..n {
        s += a[(i, ja)] * b[(i, jb)];
    }
    s
}

/// Globally-reduced dot product of two matrix columns.
pub fn col_dot<C: Comm>(
    comm: &C,
    a: MatRef<'_, f64>,
    ja: usize,
    b: MatRef<'_, f64>,
    jb: usize,
) -> f64 {
    comm.all_reduce(local_col_dot(a, ja, b, jb))
}

/// Globally-reduced Euclidean norm of a matrix column.
pub fn col_norm<C: Comm>(comm: &C, a: MatRef<'_, f64>, ja: usize) -> f64 {
    col_dot(comm, a, ja, a, ja).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;
    use faer::Mat;

    #[test]
    fn column_reductions() {
        let m = Mat::<f64>::from_fn(4, 2, |i, j| if j == 0 { (i + 1) as f64 } else { 1.0 });
        assert_eq!(col_dot(&SerialComm, m.as_ref(), 0, m.as_ref(), 1), 10.0);
        assert_eq!(col_norm(&SerialComm, m.as_ref(), 1), 2.0);
    }
}
