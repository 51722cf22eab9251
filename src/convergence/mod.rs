//! Convergence classification and the locked set.
//!
//! Each candidate Ritz pair moves `Active → Converged → Locked`; `Locked` is
//! terminal. Classification is a pure function of the globally-reduced
//! residual norm and the operator-norm estimate, so distributed runs reach
//! identical decisions on every process. When locking is disabled, converged
//! pairs stay in the active search and are reported in place (soft
//! convergence).

use faer::{Mat, MatRef};

/// Lifecycle state of a candidate Ritz pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    Active,
    Converged,
    Locked,
}

/// Residual-based convergence test.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceCheck {
    /// Tolerance relative to the operator-norm estimate.
    pub eps: f64,
}

impl ConvergenceCheck {
    pub fn classify(&self, rnorm: f64, a_norm: f64) -> CandidateState {
        if rnorm <= self.eps * a_norm.max(f64::MIN_POSITIVE) {
            CandidateState::Converged
        } else {
            CandidateState::Active
        }
    }
}

/// Converged eigenpairs permanently removed from the active search.
///
/// Vectors in the locked set stay orthogonal to the basis for the rest of
/// the run: every basis expansion re-orthogonalizes new directions against
/// them. Capacity is `num_evals`; the locked count can never exceed it.
pub struct LockedSet {
    vectors: Mat<f64>,
    values: Vec<f64>,
    rnorms: Vec<f64>,
}

impl LockedSet {
    pub fn new(n: usize, capacity: usize) -> Self {
        Self {
            vectors: Mat::zeros(n, capacity),
            values: Vec::with_capacity(capacity),
            rnorms: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.vectors.ncols()
    }

    /// Append a converged pair. Panics if the set is already full; the
    /// driver stops locking once `num_evals` pairs are in.
    pub fn push(&mut self, value: f64, vector: &[f64], rnorm: f64) {
        assert!(!self.is_full(), "locked set is full");
        assert_eq!(vector.len(), self.vectors.nrows());
        let col = self.values.len();
        for (i, &v) in vector.iter().enumerate() {
            self.vectors[(i, col)] = v;
        }
        self.values.push(value);
        self.rnorms.push(rnorm);
    }

    /// View of the locked vectors, `n × len`.
    pub fn vectors(&self) -> MatRef<'_, f64> {
        self.vectors.as_ref().submatrix(0, 0, self.vectors.nrows(), self.len())
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn rnorms(&self) -> &[f64] {
        &self.rnorms
    }
}
