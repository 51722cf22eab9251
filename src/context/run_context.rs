//! Run-scoped state: counters, budgets, method state and the RNG for
//! generated directions. One context is created per run and threaded through
//! every component call; nothing run-scoped lives in globals.

use crate::config::ResolvedOptions;
use crate::method::MethodSelector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};

/// Monotone run counters, reset only at initialization.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Operator applications, counted per column.
    pub matvecs: usize,
    /// Preconditioner applications, counted per column.
    pub preconds: usize,
    pub outer_iterations: usize,
    pub restarts: usize,
    /// Wall time of the run, set at termination.
    pub elapsed: Duration,
}

/// Per-run context owned by the outer driver loop.
pub struct RunContext {
    pub stats: RunStats,
    pub selector: MethodSelector,
    pub rng: StdRng,
    started: Instant,
    last_mark: Instant,
    max_matvecs: usize,
    max_outer: usize,
}

impl RunContext {
    pub fn new(opts: &ResolvedOptions) -> Self {
        let now = Instant::now();
        Self {
            stats: RunStats::default(),
            selector: MethodSelector::new(opts.method),
            rng: StdRng::seed_from_u64(opts.seed),
            started: now,
            last_mark: now,
            max_matvecs: opts.max_matvecs,
            max_outer: opts.max_outer_iterations,
        }
    }

    /// True once either resource budget is spent. Checked at iteration
    /// boundaries only; exhaustion is a partial success, not an error.
    pub fn budget_exhausted(&self) -> bool {
        self.stats.matvecs >= self.max_matvecs || self.stats.outer_iterations >= self.max_outer
    }

    /// Seconds since the previous mark; used to attribute wall time to the
    /// active strategy.
    pub fn mark(&mut self) -> f64 {
        let now = Instant::now();
        let dt = now.duration_since(self.last_mark).as_secs_f64();
        self.last_mark = now;
        dt
    }

    /// Record total elapsed time at termination.
    pub fn finish(&mut self) {
        self.stats.elapsed = self.started.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EigenOptions;

    #[test]
    fn budgets_trip_on_either_counter() {
        let ropts = EigenOptions {
            num_evals: 2,
            max_matvecs: 10,
            max_outer_iterations: 3,
            ..Default::default()
        }
        .resolve(50)
        .unwrap();
        let mut ctx = RunContext::new(&ropts);
        assert!(!ctx.budget_exhausted());
        ctx.stats.matvecs = 10;
        assert!(ctx.budget_exhausted());
        ctx.stats.matvecs = 0;
        ctx.stats.outer_iterations = 3;
        assert!(ctx.budget_exhausted());
    }
}
