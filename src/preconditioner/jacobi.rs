//! Jacobi (diagonal) preconditioner.

use crate::core::traits::ApplyErr;
use crate::matrix::CsrMatrix;
use crate::preconditioner::BlockPreconditioner;
use faer::{Mat, MatMut, MatRef};

/// Diagonal preconditioner: z = D⁻¹ r.
///
/// Zero diagonal entries are passed through unscaled rather than dividing.
pub struct Jacobi {
    pub inv_diag: Vec<f64>,
}

impl Jacobi {
    /// From an explicit diagonal.
    pub fn from_diagonal(diag: &[f64]) -> Self {
        let inv_diag = diag.iter().map(|&d| if d != 0.0 { 1.0 / d } else { 1.0 }).collect();
        Self { inv_diag }
    }

    /// From the diagonal of a CSR matrix.
    pub fn from_csr(a: &CsrMatrix<f64>) -> Self {
        Self::from_diagonal(&a.diagonal())
    }
}

impl BlockPreconditioner for Jacobi {
    fn apply_block(&self, r: MatRef<'_, f64>, mut z: MatMut<'_, f64>) -> Result<(), ApplyErr> {
        assert_eq!(r.nrows(), self.inv_diag.len(), "residual block has incorrect row count");
        let out = Mat::<f64>::from_fn(r.nrows(), r.ncols(), |i, j| self.inv_diag[i] * r[(i, j)]);
        z.copy_from(&out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_by_inverse_diagonal() {
        let pc = Jacobi::from_diagonal(&[2.0, 4.0, 0.0]);
        let r = Mat::<f64>::from_fn(3, 1, |i, _| (i + 1) as f64);
        let mut z = Mat::<f64>::zeros(3, 1);
        pc.apply_block(r.as_ref(), z.as_mut()).unwrap();
        assert_eq!(z[(0, 0)], 0.5);
        assert_eq!(z[(1, 0)], 0.5);
        assert_eq!(z[(2, 0)], 3.0);
    }
}
