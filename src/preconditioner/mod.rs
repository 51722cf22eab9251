//! Preconditioners for the correction equation.
//!
//! A preconditioner approximates the inverse operator and is applied in
//! blocks with the same shape contract as [`crate::core::BlockOperator`].
//! Absence of a preconditioner means the identity.

use crate::core::traits::ApplyErr;
use faer::{MatMut, MatRef};

/// A preconditioner M ≈ A⁻¹, applied one block of residuals at a time.
pub trait BlockPreconditioner {
    /// Compute z = M⁻¹ r for every column. Returning `Err` aborts the run.
    fn apply_block(&self, r: MatRef<'_, f64>, z: MatMut<'_, f64>) -> Result<(), ApplyErr>;
}

pub mod jacobi;

pub use jacobi::Jacobi;

/// Matrix-free preconditioner built from a closure `f(r, z) -> code`.
pub struct FnPreconditioner<F>
where
    F: Fn(MatRef<'_, f64>, MatMut<'_, f64>) -> i32,
{
    f: F,
}

impl<F> FnPreconditioner<F>
where
    F: Fn(MatRef<'_, f64>, MatMut<'_, f64>) -> i32,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> BlockPreconditioner for FnPreconditioner<F>
where
    F: Fn(MatRef<'_, f64>, MatMut<'_, f64>) -> i32,
{
    fn apply_block(&self, r: MatRef<'_, f64>, z: MatMut<'_, f64>) -> Result<(), ApplyErr> {
        let code = (self.f)(r, z);
        if code == 0 { Ok(()) } else { Err(ApplyErr(code)) }
    }
}
