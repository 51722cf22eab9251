//! Run configuration for the eigensolver.
//!
//! `EigenOptions` is the caller-facing surface: most fields accept a zero
//! "auto" value that is resolved against the problem dimension before any
//! matvec is issued. Inconsistent settings are rejected at that point with
//! `EigenError::InvalidConfig`, never mid-run.

use crate::error::EigenError;
use faer::Mat;

/// Which part of the spectrum is wanted.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Smallest eigenvalues first.
    Smallest,
    /// Largest eigenvalues first.
    Largest,
    /// Eigenvalues closest to any of the given values.
    ClosestTo(Vec<f64>),
}

impl Target {
    /// Sort key: smaller is closer to the target.
    pub(crate) fn distance(&self, value: f64) -> f64 {
        match self {
            Target::Smallest => value,
            Target::Largest => -value,
            Target::ClosestTo(ts) => ts
                .iter()
                .map(|t| (value - t).abs())
                .fold(f64::INFINITY, f64::min),
        }
    }
}

/// Method selection: two fixed strategies plus runtime switching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EigenMethod {
    /// Preconditioned-residual expansion with "+k" retention (GD+k flavor);
    /// tends to minimize operator applications.
    MinMatvecs,
    /// Jacobi–Davidson correction with a bounded inner solve; tends to
    /// minimize wall time when matvecs are cheap.
    MinTime,
    /// Alternate trial periods between the two fixed strategies and keep
    /// whichever measures cheaper.
    Dynamic,
}

/// Eigensolver options. Zero-valued numeric fields are resolved to defaults.
#[derive(Debug, Clone)]
pub struct EigenOptions {
    /// Number of wanted eigenpairs.
    pub num_evals: usize,
    /// Spectrum region to converge to.
    pub target: Target,
    /// Convergence tolerance, relative to the operator-norm estimate
    /// (0 = machine-precision based default).
    pub eps: f64,
    /// Caller-supplied operator norm; 0 means estimate from Ritz values.
    pub a_norm: f64,
    /// Maximum number of basis vectors (0 = auto).
    pub max_basis_size: usize,
    /// Basis size kept after a restart (0 = auto).
    pub min_restart_size: usize,
    /// Columns per matrix-apply call (0 = 1).
    pub max_block_size: usize,
    /// Matvec budget (0 = unlimited). Exhaustion is a partial success.
    pub max_matvecs: usize,
    /// Outer iteration budget (0 = unlimited).
    pub max_outer_iterations: usize,
    /// Remove converged pairs from the search ("hard" locking) or report them
    /// in place (soft convergence).
    pub locking: bool,
    /// Fixed strategy or runtime switching.
    pub method: EigenMethod,
    /// Number of previous-iteration Ritz vectors retained through a restart
    /// ("+k"; 0 = block size). A heuristic knob, clamped to the basis room.
    pub restart_retained: usize,
    /// Inner iteration bound for the Jacobi–Davidson correction (0 = 5).
    pub inner_iterations: usize,
    /// Relative norm drop below which a new direction counts as linearly
    /// dependent and is rejected (0 = 1e-10).
    pub ortho_tol: f64,
    /// Seed for generated starting/recovery vectors; runs are reproducible.
    pub seed: u64,
    /// Optional starting vectors (`n` rows, up to `max_basis_size` columns);
    /// missing columns are filled with seeded random vectors.
    pub init_guess: Option<Mat<f64>>,
}

impl Default for EigenOptions {
    fn default() -> Self {
        Self {
            num_evals: 1,
            target: Target::Smallest,
            eps: 0.0,
            a_norm: 0.0,
            max_basis_size: 0,
            min_restart_size: 0,
            max_block_size: 0,
            max_matvecs: 0,
            max_outer_iterations: 0,
            locking: true,
            method: EigenMethod::Dynamic,
            restart_retained: 0,
            inner_iterations: 0,
            ortho_tol: 0.0,
            seed: 0x6b7279_6461_76,
            init_guess: None,
        }
    }
}

/// Options after defaulting and validation against the problem dimension.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub n: usize,
    pub num_evals: usize,
    pub target: Target,
    pub eps: f64,
    pub a_norm: f64,
    pub max_basis_size: usize,
    pub min_restart_size: usize,
    pub max_block_size: usize,
    pub max_matvecs: usize,
    pub max_outer_iterations: usize,
    pub locking: bool,
    pub method: EigenMethod,
    pub restart_retained: usize,
    pub inner_iterations: usize,
    pub ortho_tol: f64,
    pub seed: u64,
}

impl EigenOptions {
    /// Fill in auto defaults and check consistency for a problem of
    /// dimension `n`. Runs before the first matvec; every inconsistency is a
    /// fatal configuration error.
    pub fn resolve(&self, n: usize) -> Result<ResolvedOptions, EigenError> {
        if n == 0 {
            return Err(EigenError::InvalidConfig("matrix dimension is zero".into()));
        }
        if self.num_evals == 0 {
            return Err(EigenError::InvalidConfig("num_evals must be at least 1".into()));
        }
        if self.num_evals > n {
            return Err(EigenError::InvalidConfig(format!(
                "num_evals ({}) exceeds matrix dimension ({})",
                self.num_evals, n
            )));
        }
        if self.eps < 0.0 || !self.eps.is_finite() {
            return Err(EigenError::InvalidConfig("eps must be finite and non-negative".into()));
        }
        if let Target::ClosestTo(ts) = &self.target {
            if ts.is_empty() {
                return Err(EigenError::InvalidConfig(
                    "ClosestTo target needs at least one value".into(),
                ));
            }
        }

        let block = match self.max_block_size {
            0 => 1,
            b if b > n => {
                return Err(EigenError::InvalidConfig(format!(
                    "max_block_size ({b}) exceeds matrix dimension ({n})"
                )));
            }
            b => b,
        };

        let max_basis = match self.max_basis_size {
            0 => n.min((2 * self.num_evals + block).max(15)),
            m if m > n => {
                return Err(EigenError::InvalidConfig(format!(
                    "max_basis_size ({m}) exceeds matrix dimension ({n})"
                )));
            }
            m => m,
        };

        let min_restart = match self.min_restart_size {
            0 => {
                let auto = self.num_evals.max(max_basis / 3).max(1);
                // Leave room for at least one expansion past the restart point.
                auto.min(max_basis.saturating_sub(block).max(1))
            }
            m => m,
        };
        if min_restart > max_basis {
            return Err(EigenError::InvalidConfig(format!(
                "min_restart_size ({min_restart}) exceeds max_basis_size ({max_basis})"
            )));
        }
        // When the basis spans the whole space the projected problem is the
        // full problem, so no expansion room is needed; only a truncated
        // basis must leave room for one block past the restart point.
        if min_restart + block > max_basis && max_basis < n {
            return Err(EigenError::InvalidConfig(format!(
                "min_restart_size ({min_restart}) plus block size ({block}) exceeds max_basis_size ({max_basis})"
            )));
        }
        if !self.locking && min_restart < self.num_evals {
            return Err(EigenError::InvalidConfig(format!(
                "without locking, min_restart_size ({}) must be at least num_evals ({})",
                min_restart, self.num_evals
            )));
        }

        // "+k" retention is a heuristic; clamp it into the remaining room.
        let room = max_basis.saturating_sub(min_restart + block);
        let retained = match self.restart_retained {
            0 => block.min(room),
            k => k.min(room),
        };

        if let Some(guess) = &self.init_guess {
            if guess.nrows() != n {
                return Err(EigenError::InvalidConfig(format!(
                    "init_guess has {} rows, expected {n}",
                    guess.nrows()
                )));
            }
            if guess.ncols() > max_basis {
                return Err(EigenError::InvalidConfig(format!(
                    "init_guess has {} columns, more than max_basis_size ({max_basis})",
                    guess.ncols()
                )));
            }
        }

        Ok(ResolvedOptions {
            n,
            num_evals: self.num_evals,
            target: self.target.clone(),
            eps: if self.eps == 0.0 { f64::EPSILON * 1e4 } else { self.eps },
            a_norm: self.a_norm.max(0.0),
            max_basis_size: max_basis,
            min_restart_size: min_restart,
            max_block_size: block,
            max_matvecs: if self.max_matvecs == 0 { usize::MAX } else { self.max_matvecs },
            max_outer_iterations: if self.max_outer_iterations == 0 {
                usize::MAX
            } else {
                self.max_outer_iterations
            },
            locking: self.locking,
            method: self.method,
            restart_retained: retained,
            inner_iterations: if self.inner_iterations == 0 { 5 } else { self.inner_iterations },
            ortho_tol: if self.ortho_tol == 0.0 { 1e-10 } else { self.ortho_tol },
            seed: self.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_defaults_fit_the_dimension() {
        let opts = EigenOptions { num_evals: 10, ..Default::default() };
        let r = opts.resolve(100).unwrap();
        assert_eq!(r.max_block_size, 1);
        assert_eq!(r.max_basis_size, 21);
        assert!(r.min_restart_size >= r.num_evals);
        assert!(r.min_restart_size + r.max_block_size <= r.max_basis_size);
        assert!(r.eps > 0.0);
    }

    #[test]
    fn rejects_inconsistent_sizes() {
        let opts = EigenOptions {
            num_evals: 2,
            max_basis_size: 8,
            min_restart_size: 8,
            ..Default::default()
        };
        assert!(matches!(opts.resolve(50), Err(EigenError::InvalidConfig(_))));

        let opts = EigenOptions { num_evals: 0, ..Default::default() };
        assert!(opts.resolve(50).is_err());

        let opts = EigenOptions { num_evals: 60, ..Default::default() };
        assert!(opts.resolve(50).is_err());
    }

    #[test]
    fn soft_mode_needs_room_for_all_pairs() {
        let opts = EigenOptions {
            num_evals: 6,
            locking: false,
            max_basis_size: 10,
            min_restart_size: 4,
            ..Default::default()
        };
        assert!(opts.resolve(40).is_err());
    }

    #[test]
    fn full_basis_dimensions_need_no_expansion_room() {
        // n = 1 forces max_basis = n with no room past the restart point;
        // that is still a solvable configuration.
        let r = EigenOptions { num_evals: 1, ..Default::default() }.resolve(1).unwrap();
        assert_eq!(r.max_basis_size, 1);
        assert_eq!(r.min_restart_size, 1);
        assert_eq!(r.restart_retained, 0);

        // A truncated basis still must leave room for one block.
        let opts = EigenOptions {
            num_evals: 2,
            max_basis_size: 6,
            min_restart_size: 6,
            ..Default::default()
        };
        assert!(opts.resolve(10).is_err());
    }

    #[test]
    fn retention_is_clamped_not_rejected() {
        let opts = EigenOptions {
            num_evals: 2,
            max_basis_size: 12,
            min_restart_size: 6,
            restart_retained: 100,
            ..Default::default()
        };
        let r = opts.resolve(40).unwrap();
        assert!(r.restart_retained + r.min_restart_size + r.max_block_size <= r.max_basis_size);
    }
}
