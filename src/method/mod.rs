//! Method selection.
//!
//! Two fixed strategies compete: `MinMatvecs` (preconditioned-residual
//! expansion with "+k" retention) and `MinTime` (Jacobi–Davidson with a
//! bounded inner solve). In dynamic mode the selector alternates trial
//! periods between them, accumulates the measured cost of each, and keeps
//! whichever is cheaper per unit of progress. Wall time is the primary cost;
//! matvec counts take over when timings are too small to trust. Ties favor
//! the incumbent so the selector cannot thrash between near-equal strategies.

use crate::config::EigenMethod;

/// Outer iterations per dynamic trial period.
const TRIAL_ITERS: usize = 5;
/// Relative advantage the challenger must show before a switch.
const HYSTERESIS: f64 = 0.05;
/// Relative margin under which the final recommendation is a close call.
const CLOSE_CALL_MARGIN: f64 = 0.1;
/// Below this, accumulated wall time is considered unmeasurable.
const MIN_MEASURED_SECS: f64 = 1e-6;

/// The two concrete strategies the selector can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedMethod {
    MinMatvecs,
    MinTime,
}

impl FixedMethod {
    fn slot(self) -> usize {
        match self {
            FixedMethod::MinMatvecs => 0,
            FixedMethod::MinTime => 1,
        }
    }

    fn other(self) -> FixedMethod {
        match self {
            FixedMethod::MinMatvecs => FixedMethod::MinTime,
            FixedMethod::MinTime => FixedMethod::MinMatvecs,
        }
    }
}

/// End-of-run hint for the caller's next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodRecommendation {
    /// Fixed strategy that measured cheaper over this run.
    pub preferred: FixedMethod,
    /// The two strategies were within a small relative margin of each other.
    pub close_call: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct StrategyCost {
    seconds: f64,
    matvecs: usize,
    converged: usize,
    iters: usize,
}

impl StrategyCost {
    fn tried(&self) -> bool {
        self.iters > 0
    }
}

/// Per-run method state: the active strategy and the cost ledger behind
/// dynamic switching.
#[derive(Debug)]
pub struct MethodSelector {
    mode: EigenMethod,
    active: FixedMethod,
    cost: [StrategyCost; 2],
    iters_in_trial: usize,
    switches: usize,
}

impl MethodSelector {
    pub fn new(mode: EigenMethod) -> Self {
        let active = match mode {
            EigenMethod::MinMatvecs => FixedMethod::MinMatvecs,
            // Dynamic starts on the time-oriented strategy, matching the
            // original heuristic's first trial.
            EigenMethod::MinTime | EigenMethod::Dynamic => FixedMethod::MinTime,
        };
        Self { mode, active, cost: [StrategyCost::default(); 2], iters_in_trial: 0, switches: 0 }
    }

    /// Strategy currently driving the correction policy and restart size.
    pub fn active(&self) -> FixedMethod {
        self.active
    }

    /// Number of strategy switches performed so far.
    pub fn switches(&self) -> usize {
        self.switches
    }

    /// Record one outer iteration's cost under the active strategy, and in
    /// dynamic mode re-evaluate the choice at trial-period boundaries.
    pub fn observe(&mut self, seconds: f64, matvecs: usize, newly_converged: usize) {
        let slot = &mut self.cost[self.active.slot()];
        slot.seconds += seconds.max(0.0);
        slot.matvecs += matvecs;
        slot.converged += newly_converged;
        slot.iters += 1;
        if self.mode != EigenMethod::Dynamic {
            return;
        }
        self.iters_in_trial += 1;
        if self.iters_in_trial >= TRIAL_ITERS {
            self.iters_in_trial = 0;
            self.evaluate_switch();
        }
    }

    fn evaluate_switch(&mut self) {
        let other = self.active.other();
        if !self.cost[other.slot()].tried() {
            // Both strategies must be sampled before costs are comparable.
            self.active = other;
            self.switches += 1;
            return;
        }
        let (r_active, r_other) = (self.rate(self.active), self.rate(other));
        if r_other < r_active * (1.0 - HYSTERESIS) {
            self.active = other;
            self.switches += 1;
        }
    }

    /// Amortized cost per unit of progress for one strategy. Progress is
    /// converged pairs when both strategies have some, outer iterations
    /// otherwise; cost is wall time when both timings are measurable,
    /// matvecs otherwise. Both sides of a comparison always use the same
    /// units.
    fn rate(&self, which: FixedMethod) -> f64 {
        let a = &self.cost[0];
        let b = &self.cost[1];
        let use_time =
            a.seconds > MIN_MEASURED_SECS && b.seconds > MIN_MEASURED_SECS;
        let use_converged = a.converged > 0 && b.converged > 0;
        let s = &self.cost[which.slot()];
        let cost = if use_time { s.seconds } else { s.matvecs as f64 };
        let progress =
            if use_converged { s.converged as f64 } else { s.iters.max(1) as f64 };
        cost / progress
    }

    /// Post-run hint; `None` unless running in dynamic mode.
    pub fn recommendation(&self) -> Option<MethodRecommendation> {
        if self.mode != EigenMethod::Dynamic {
            return None;
        }
        let (a, b) = (&self.cost[0], &self.cost[1]);
        if !a.tried() || !b.tried() {
            return Some(MethodRecommendation { preferred: self.active, close_call: false });
        }
        let (ra, rb) = (self.rate(FixedMethod::MinMatvecs), self.rate(FixedMethod::MinTime));
        let preferred = if ra <= rb { FixedMethod::MinMatvecs } else { FixedMethod::MinTime };
        let close_call = (ra - rb).abs() <= CLOSE_CALL_MARGIN * ra.max(rb).max(f64::MIN_POSITIVE);
        Some(MethodRecommendation { preferred, close_call })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_modes_never_switch() {
        let mut sel = MethodSelector::new(EigenMethod::MinMatvecs);
        for _ in 0..50 {
            sel.observe(0.0, 100, 0);
        }
        assert_eq!(sel.active(), FixedMethod::MinMatvecs);
        assert_eq!(sel.switches(), 0);
        assert!(sel.recommendation().is_none());
    }

    #[test]
    fn dynamic_samples_both_then_keeps_the_cheaper() {
        let mut sel = MethodSelector::new(EigenMethod::Dynamic);
        assert_eq!(sel.active(), FixedMethod::MinTime);
        // First trial period: expensive (many matvecs per converged pair).
        for _ in 0..TRIAL_ITERS {
            sel.observe(0.0, 40, 1);
        }
        // Forced switch to sample the other strategy.
        assert_eq!(sel.active(), FixedMethod::MinMatvecs);
        // Second trial period: cheap.
        for _ in 0..TRIAL_ITERS {
            sel.observe(0.0, 10, 1);
        }
        // Cheaper strategy stays active.
        assert_eq!(sel.active(), FixedMethod::MinMatvecs);
        let rec = sel.recommendation().unwrap();
        assert_eq!(rec.preferred, FixedMethod::MinMatvecs);
        assert!(!rec.close_call);
    }

    #[test]
    fn hysteresis_keeps_the_incumbent_on_a_tie() {
        let mut sel = MethodSelector::new(EigenMethod::Dynamic);
        for _ in 0..TRIAL_ITERS {
            sel.observe(0.0, 20, 1);
        }
        for _ in 0..TRIAL_ITERS {
            sel.observe(0.0, 20, 1);
        }
        // Identical measured costs: the incumbent (post-sampling switch)
        // must not be displaced, and the recommendation is a close call.
        let incumbent = sel.active();
        for _ in 0..TRIAL_ITERS {
            sel.observe(0.0, 20, 1);
        }
        assert_eq!(sel.active(), incumbent);
        let rec = sel.recommendation().unwrap();
        assert!(rec.close_call);
    }
}
