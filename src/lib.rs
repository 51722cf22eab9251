//! # krydav
//!
//! Matrix-free block Davidson eigensolvers for large symmetric problems.
//!
//! The solver finds a few eigenpairs of a symmetric operator known only
//! through block matrix-vector products. It combines Rayleigh-Ritz
//! extraction over a bounded basis with hard locking of converged pairs,
//! thick restarts that retain Ritz vectors from the previous iteration, and
//! runtime switching between a matvec-frugal correction and a
//! Jacobi-Davidson inner solve.
//!
//! ## Example
//!
//! ```
//! use krydav::matrix::CsrMatrix;
//! use krydav::config::EigenOptions;
//! use krydav::solver::solve_symmetric;
//!
//! let op = CsrMatrix::<f64>::laplacian_1d(100);
//! let opts = EigenOptions { num_evals: 4, eps: 1e-8, ..Default::default() };
//! let mut evals = [0.0; 4];
//! let mut evecs = vec![0.0; 400];
//! let mut rnorms = [0.0; 4];
//! let report = solve_symmetric(&op, None, opts, &mut evals, &mut evecs, &mut rnorms).unwrap();
//! assert_eq!(report.converged, 4);
//! ```

pub mod config;
pub mod context;
pub mod convergence;
pub mod core;
pub mod correction;
pub mod error;
pub mod kernels;
pub mod matrix;
pub mod method;
pub mod parallel;
pub mod preconditioner;
pub mod solver;
pub mod subspace;

pub use config::{EigenMethod, EigenOptions, Target};
pub use crate::core::{ApplyErr, BlockOperator, FnOperator};
pub use error::EigenError;
pub use matrix::CsrMatrix;
pub use method::{FixedMethod, MethodRecommendation};
pub use parallel::{Comm, SerialComm};
pub use preconditioner::{BlockPreconditioner, FnPreconditioner, Jacobi};
pub use solver::{solve_symmetric, EigenSolver, RunFlags, RunReport, RunStatus};
