//! Operator adapters for dense matrices and plain closures.
//!
//! `faer::Mat<f64>` and `MatRef<f64>` act directly as block operators, and
//! [`FnOperator`] lifts a closure into one, which is the usual way to hand the
//! engine a matrix that is never formed explicitly.

use crate::core::traits::{ApplyErr, BlockOperator};
use faer::{Mat, MatMut, MatRef};

impl BlockOperator for Mat<f64> {
    fn nrows(&self) -> usize {
        self.nrows()
    }

    fn apply_block(&self, x: MatRef<'_, f64>, mut y: MatMut<'_, f64>) -> Result<(), ApplyErr> {
        assert_eq!(self.ncols(), x.nrows(), "input block has incorrect row count");
        assert_eq!(self.nrows(), y.nrows(), "output block has incorrect row count");
        assert_eq!(x.ncols(), y.ncols(), "input and output blocks differ in width");
        let prod: Mat<f64> = self.as_ref() * x;
        y.copy_from(&prod);
        Ok(())
    }
}

impl<'m> BlockOperator for MatRef<'m, f64> {
    fn nrows(&self) -> usize {
        MatRef::nrows(self)
    }

    fn apply_block(&self, x: MatRef<'_, f64>, mut y: MatMut<'_, f64>) -> Result<(), ApplyErr> {
        assert_eq!(self.ncols(), x.nrows(), "input block has incorrect row count");
        let prod: Mat<f64> = *self * x;
        y.copy_from(&prod);
        Ok(())
    }
}

/// Matrix-free operator built from a closure `f(x, y) -> code`.
///
/// The closure receives the input block and the output block and returns a
/// status code; any nonzero code aborts the run with that code.
pub struct FnOperator<F>
where
    F: Fn(MatRef<'_, f64>, MatMut<'_, f64>) -> i32,
{
    n: usize,
    f: F,
}

impl<F> FnOperator<F>
where
    F: Fn(MatRef<'_, f64>, MatMut<'_, f64>) -> i32,
{
    /// Wrap a closure as an operator of dimension `n`.
    pub fn new(n: usize, f: F) -> Self {
        Self { n, f }
    }
}

impl<F> BlockOperator for FnOperator<F>
where
    F: Fn(MatRef<'_, f64>, MatMut<'_, f64>) -> i32,
{
    fn nrows(&self) -> usize {
        self.n
    }

    fn apply_block(&self, x: MatRef<'_, f64>, y: MatMut<'_, f64>) -> Result<(), ApplyErr> {
        let code = (self.f)(x, y);
        if code == 0 { Ok(()) } else { Err(ApplyErr(code)) }
    }
}
