use thiserror::Error;

// Unified error type for krydav

#[derive(Error, Debug)]
pub enum EigenError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("matrix-apply callback failed with code {code} after {matvecs} matvecs")]
    OperatorApply { code: i32, matvecs: usize },
    #[error("preconditioner-apply callback failed with code {code} after {applies} applies")]
    PreconditionerApply { code: i32, applies: usize },
    #[error("projected eigensolve failed: {0}")]
    ProjectedSolve(String),
}
