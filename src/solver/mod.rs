//! Outer driver loop: block Davidson iteration with hard locking, thick
//! restarts, and runtime method switching.
//!
//! One `solve` call runs the whole search: seed the basis, then iterate
//! Rayleigh-Ritz, classification, correction and expansion until every wanted
//! pair converges or a resource budget runs out. Budget exhaustion and
//! stagnation are partial successes reported through `RunStatus`; only
//! configuration errors and callback failures are `Err`.

use crate::config::{EigenOptions, ResolvedOptions};
use crate::context::{RunContext, RunStats};
use crate::convergence::{CandidateState, ConvergenceCheck, LockedSet};
use crate::core::traits::BlockOperator;
use crate::correction::{CorrectionKind, CorrectionSolver};
use crate::error::EigenError;
use crate::kernels::projected::order_indices;
use crate::method::{FixedMethod, MethodRecommendation};
use crate::parallel::Comm;
use crate::preconditioner::BlockPreconditioner;
use crate::subspace::SubspaceManager;
use bitflags::bitflags;
use faer::Mat;
use rand::Rng;

/// Random-block injections tolerated per restart cycle before the run is
/// declared stagnated.
const MAX_INJECTIONS: usize = 2;

bitflags! {
    /// Advisory conditions observed during a run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RunFlags: u32 {
        /// The search space degenerated against the locked set and random
        /// recovery failed; reported pairs may be a strict subset.
        const LOCKING_PROBLEM = 1;
        /// Dynamic selection measured the two strategies within a small
        /// margin; the recommendation is weak.
        const CLOSE_CALL = 1 << 1;
    }
}

/// How a run ended. All three variants come with valid output arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every wanted pair converged to tolerance.
    ConvergedAll,
    /// A matvec or iteration budget ran out first.
    BudgetExhausted,
    /// No new search direction could be produced.
    Stagnated,
}

/// Outcome of a `solve` call.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    /// Number of leading output pairs that meet the tolerance.
    pub converged: usize,
    pub stats: RunStats,
    pub flags: RunFlags,
    /// Fixed-method hint for the caller's next run (dynamic mode only).
    pub recommendation: Option<MethodRecommendation>,
}

pub struct EigenSolver {
    opts: EigenOptions,
}

impl EigenSolver {
    pub fn new(opts: EigenOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &EigenOptions {
        &self.opts
    }

    /// Find the wanted eigenpairs of `op`. `evecs` is column-major with
    /// `op.nrows()` rows per vector; all three outputs are sorted by the
    /// target ordering. Returns `Err` only for configuration problems and
    /// callback failures.
    pub fn solve<C: Comm>(
        &self,
        op: &dyn BlockOperator,
        pc: Option<&dyn BlockPreconditioner>,
        comm: &C,
        evals: &mut [f64],
        evecs: &mut [f64],
        rnorms: &mut [f64],
    ) -> Result<RunReport, EigenError> {
        let n = op.nrows();
        let ropts = self.opts.resolve(n)?;
        let k = ropts.num_evals;
        if evals.len() < k || rnorms.len() < k || evecs.len() < n * k {
            return Err(EigenError::InvalidConfig(format!(
                "output arrays too small for {k} eigenpairs of dimension {n}"
            )));
        }

        let mut ctx = RunContext::new(&ropts);
        let mut sub = SubspaceManager::new(&ropts);
        let mut locked = LockedSet::new(n, k);
        let check = ConvergenceCheck { eps: ropts.eps };

        self.seed_basis(op, comm, &ropts, &mut sub, &locked, &mut ctx)?;

        let status;
        let mut flags = RunFlags::empty();
        let mut prev_soft = 0usize;
        let mut soft_keep: Vec<usize> = Vec::new();
        let mut injections = 0usize;

        loop {
            if !sub.ritz_current() {
                sub.rayleigh_ritz()?;
            }

            let mut newly_converged = 0usize;
            if ropts.locking {
                while !locked.is_full() && sub.size() > 0 {
                    let lead = sub.leading_pairs(comm, 1)[0];
                    if check.classify(lead.rnorm, sub.a_norm()) != CandidateState::Converged {
                        break;
                    }
                    let (value, vector) = sub.lock_out(lead.pos);
                    locked.push(value, &vector, lead.rnorm);
                    newly_converged += 1;
                }
                if locked.is_full() {
                    status = RunStatus::ConvergedAll;
                    break;
                }
                if sub.size() == 0 {
                    // Locking consumed the whole basis; re-seed against the
                    // locked set.
                    let cols = ropts.min_restart_size;
                    let mut rnd = self.random_block(n, cols, &mut ctx);
                    if sub.expand(comm, locked.vectors(), &mut rnd, cols, op, &mut ctx)? == 0 {
                        flags |= RunFlags::LOCKING_PROBLEM;
                        status = RunStatus::Stagnated;
                        break;
                    }
                    sub.rayleigh_ritz()?;
                }
            } else {
                let window = k.min(sub.size());
                soft_keep = sub
                    .leading_pairs(comm, window)
                    .into_iter()
                    .filter(|p| {
                        check.classify(p.rnorm, sub.a_norm()) == CandidateState::Converged
                    })
                    .map(|p| p.pos)
                    .collect();
                let soft = soft_keep.len();
                newly_converged = soft.saturating_sub(prev_soft);
                prev_soft = soft;
                if soft == k {
                    status = RunStatus::ConvergedAll;
                    break;
                }
            }

            if ctx.budget_exhausted() {
                status = RunStatus::BudgetExhausted;
                break;
            }
            ctx.stats.outer_iterations += 1;
            let matvecs_before = ctx.stats.matvecs;

            let block = ropts.max_block_size;
            if sub.needs_restart(block) {
                // Converged-in-place pairs must survive the truncation.
                sub.restart(comm, &soft_keep);
                ctx.stats.restarts += 1;
                injections = 0;
                if !sub.ritz_current() {
                    sub.rayleigh_ritz()?;
                }
            }
            // Retention is a GD+k device; the Jacobi-Davidson strategy keeps
            // at most one previous Ritz vector.
            let retain = match ctx.selector.active() {
                FixedMethod::MinMatvecs => ropts.restart_retained,
                FixedMethod::MinTime => ropts.restart_retained.min(1),
            };
            if retain > 0 {
                sub.snapshot_retained(retain);
            }

            // Candidate block: the first unconverged pairs in target order.
            // A full-dimension basis may leave no expansion room at all.
            let width = block.min(ropts.max_basis_size - sub.size());
            let window = (k - locked.len() + width).min(sub.size());
            let positions: Vec<usize> = sub
                .leading_pairs(comm, window)
                .into_iter()
                .filter(|p| check.classify(p.rnorm, sub.a_norm()) == CandidateState::Active)
                .take(width)
                .map(|p| p.pos)
                .collect();
            if positions.is_empty() {
                // Every pair in the window is converged yet the run is not
                // done (soft mode with a thin basis). Grow the space with a
                // seeded random block instead.
                if injections >= MAX_INJECTIONS {
                    flags |= RunFlags::LOCKING_PROBLEM;
                    status = RunStatus::Stagnated;
                    break;
                }
                injections += 1;
                let mut rnd = self.random_block(n, width, &mut ctx);
                if sub.expand(comm, locked.vectors(), &mut rnd, width, op, &mut ctx)? == 0 {
                    flags |= RunFlags::LOCKING_PROBLEM;
                    status = RunStatus::Stagnated;
                    break;
                }
                let seconds = ctx.mark();
                ctx.selector
                    .observe(seconds, ctx.stats.matvecs - matvecs_before, newly_converged);
                continue;
            }
            let (thetas, xs, rs, _) = sub.residual_block(comm, &positions);

            let kind = match ctx.selector.active() {
                FixedMethod::MinMatvecs => CorrectionKind::PrecondResidual,
                FixedMethod::MinTime => {
                    CorrectionKind::JacobiDavidson { inner_iters: ropts.inner_iterations }
                }
            };
            let correction = CorrectionSolver::new(kind);
            let mut dirs =
                correction.directions(op, pc, comm, &thetas, xs.as_ref(), rs.as_ref(), &mut ctx)?;

            let b = positions.len();
            let mut accepted =
                sub.expand(comm, locked.vectors(), &mut dirs, b, op, &mut ctx)?;
            if accepted == 0 {
                // Every proposed direction was linearly dependent. Inject a
                // seeded random block before giving up.
                if injections >= MAX_INJECTIONS {
                    flags |= RunFlags::LOCKING_PROBLEM;
                    status = RunStatus::Stagnated;
                    break;
                }
                injections += 1;
                let mut rnd = self.random_block(n, b, &mut ctx);
                accepted = sub.expand(comm, locked.vectors(), &mut rnd, b, op, &mut ctx)?;
                if accepted == 0 {
                    flags |= RunFlags::LOCKING_PROBLEM;
                    status = RunStatus::Stagnated;
                    break;
                }
            }

            let seconds = ctx.mark();
            ctx.selector
                .observe(seconds, ctx.stats.matvecs - matvecs_before, newly_converged);
        }

        ctx.finish();
        let recommendation = ctx.selector.recommendation();
        if let Some(rec) = recommendation {
            if rec.close_call {
                flags |= RunFlags::CLOSE_CALL;
            }
        }
        let converged =
            self.emit(&ropts, comm, &mut sub, &locked, &check, evals, evecs, rnorms)?;
        Ok(RunReport { status, converged, stats: ctx.stats.clone(), flags, recommendation })
    }

    /// Seed the basis with `min_restart_size` columns: caller guesses first,
    /// seeded random vectors for the rest.
    fn seed_basis<C: Comm>(
        &self,
        op: &dyn BlockOperator,
        comm: &C,
        ropts: &ResolvedOptions,
        sub: &mut SubspaceManager,
        locked: &LockedSet,
        ctx: &mut RunContext,
    ) -> Result<(), EigenError> {
        let n = ropts.n;
        let cols = ropts.min_restart_size;
        let guessed = self.opts.init_guess.as_ref().map_or(0, |g| g.ncols().min(cols));
        let mut block = Mat::<f64>::zeros(n, cols);
        if let Some(guess) = &self.opts.init_guess {
            for j in 0..guessed {
                for i in 0..n {
                    block[(i, j)] = guess[(i, j)];
                }
            }
        }
        for j in guessed..cols {
            for i in 0..n {
                block[(i, j)] = ctx.rng.r#gen::<f64>() * 2.0 - 1.0;
            }
        }
        let mut accepted = sub.expand(comm, locked.vectors(), &mut block, cols, op, ctx)?;
        let mut tries = 0;
        while accepted == 0 && tries < MAX_INJECTIONS {
            tries += 1;
            let mut rnd = self.random_block(n, cols, ctx);
            accepted = sub.expand(comm, locked.vectors(), &mut rnd, cols, op, ctx)?;
        }
        if accepted == 0 {
            return Err(EigenError::InvalidConfig(
                "could not build an initial orthonormal basis".into(),
            ));
        }
        Ok(())
    }

    fn random_block(&self, n: usize, cols: usize, ctx: &mut RunContext) -> Mat<f64> {
        Mat::from_fn(n, cols, |_, _| ctx.rng.r#gen::<f64>() * 2.0 - 1.0)
    }

    /// Write the final pairs into the output arrays, converged pairs first in
    /// target order, then the best available Ritz approximations.
    #[allow(clippy::too_many_arguments)]
    fn emit<C: Comm>(
        &self,
        ropts: &ResolvedOptions,
        comm: &C,
        sub: &mut SubspaceManager,
        locked: &LockedSet,
        check: &ConvergenceCheck,
        evals: &mut [f64],
        evecs: &mut [f64],
        rnorms: &mut [f64],
    ) -> Result<usize, EigenError> {
        let n = ropts.n;
        let k = ropts.num_evals;
        let mut values: Vec<f64> = Vec::with_capacity(k);
        let mut vectors: Vec<Vec<f64>> = Vec::with_capacity(k);
        let mut norms: Vec<f64> = Vec::with_capacity(k);
        let mut converged_flags: Vec<bool> = Vec::with_capacity(k);

        for (i, &v) in locked.values().iter().enumerate() {
            values.push(v);
            vectors.push((0..n).map(|r| locked.vectors()[(r, i)]).collect());
            norms.push(locked.rnorms()[i]);
            converged_flags.push(true);
        }

        if values.len() < k && sub.size() > 0 {
            if !sub.ritz_current() {
                sub.rayleigh_ritz()?;
            }
            let need = k - values.len();
            for p in sub.leading_pairs(comm, need.min(sub.size())) {
                values.push(p.value);
                vectors.push(sub.ritz_vector(p.pos));
                norms.push(p.rnorm);
                converged_flags
                    .push(check.classify(p.rnorm, sub.a_norm()) == CandidateState::Converged);
            }
        }

        let tie_tol = f64::EPSILON * 100.0 * sub.a_norm().max(1.0);
        let order = order_indices(&values, &ropts.target, tie_tol, Some(&norms));
        let mut converged = 0usize;
        for (dst, &src) in order.iter().enumerate().take(k) {
            evals[dst] = values[src];
            rnorms[dst] = norms[src];
            evecs[dst * n..(dst + 1) * n].copy_from_slice(&vectors[src]);
            if converged_flags[src] {
                converged += 1;
            }
        }
        Ok(converged)
    }
}

/// Convenience entry point used by most single-process callers.
pub fn solve_symmetric(
    op: &dyn BlockOperator,
    pc: Option<&dyn BlockPreconditioner>,
    opts: EigenOptions,
    evals: &mut [f64],
    evecs: &mut [f64],
    rnorms: &mut [f64],
) -> Result<RunReport, EigenError> {
    EigenSolver::new(opts).solve(op, pc, &crate::parallel::SerialComm, evals, evecs, rnorms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use crate::matrix::CsrMatrix;
    use crate::parallel::SerialComm;
    use approx::assert_relative_eq;

    #[test]
    fn diagonal_matrix_full_basis_is_exact() {
        // With max_basis = n the projected problem is the full problem and
        // one Rayleigh-Ritz nails every eigenpair.
        let n = 6;
        let diag = [3.0, -1.0, 7.0, 0.5, 2.0, -4.0];
        let triplets: Vec<(usize, usize, f64)> =
            (0..n).map(|i| (i, i, diag[i])).collect();
        let op = CsrMatrix::<f64>::from_triplets(n, n, &triplets);
        let opts = EigenOptions {
            num_evals: 3,
            target: Target::ClosestTo(vec![0.0]),
            eps: 1e-12,
            max_basis_size: n,
            min_restart_size: 3,
            ..Default::default()
        };
        let mut evals = [0.0; 3];
        let mut evecs = [0.0; 18];
        let mut rnorms = [0.0; 3];
        let report =
            solve_symmetric(&op, None, opts, &mut evals, &mut evecs, &mut rnorms).unwrap();
        assert_eq!(report.status, RunStatus::ConvergedAll);
        assert_eq!(report.converged, 3);
        // Closest to zero: 0.5, -1.0, 2.0 in that order of distance.
        assert_relative_eq!(evals[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(evals[1], -1.0, epsilon = 1e-9);
        assert_relative_eq!(evals[2], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn rejects_undersized_outputs() {
        let op = CsrMatrix::<f64>::laplacian_1d(10);
        let opts = EigenOptions { num_evals: 2, ..Default::default() };
        let mut evals = [0.0; 1];
        let mut evecs = [0.0; 20];
        let mut rnorms = [0.0; 2];
        let err = EigenSolver::new(opts)
            .solve(&op, None, &SerialComm, &mut evals, &mut evecs, &mut rnorms)
            .unwrap_err();
        assert!(matches!(err, EigenError::InvalidConfig(_)));
    }
}
