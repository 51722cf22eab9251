//! Concrete matrix types usable as block operators.

pub mod sparse;

pub use sparse::CsrMatrix;
