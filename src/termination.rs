//! Run counters and the stopping rules.
//!
//! A run stops for exactly one of three reasons, checked in this order:
//!
//! 1. the evaluation budget `nf` is used up,
//! 2. no box is left that can be split,
//! 3. `nsweeps` full sweeps have completed.
//!
//! Only completed sweeps count toward `nsweeps`; a sweep cut short by the evaluation
//! budget does not.

use crate::error::ExitStatus;

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Objective evaluations, including those spent in local search.
    pub evaluations: usize,
    /// Completed sweeps.
    pub sweeps: usize,
    /// Local searches started.
    pub local_searches: usize,
    /// Objective evaluations spent inside local searches.
    pub local_evaluations: usize,
    /// Boxes split.
    pub splits: usize,
}

/// Budget limits of a run.
#[derive(Debug, Clone, Copy)]
pub struct Termination {
    pub nf: usize,
    pub nsweeps: usize,
}

impl Termination {
    pub fn new(nf: usize, nsweeps: usize) -> Self {
        Self { nf, nsweeps }
    }

    /// Returns true if no further objective evaluation is allowed.
    #[inline]
    pub fn evaluations_exhausted(&self, counters: &RunCounters) -> bool {
        counters.evaluations >= self.nf
    }

    /// Evaluations still available.
    #[inline]
    pub fn evaluations_left(&self, counters: &RunCounters) -> usize {
        self.nf.saturating_sub(counters.evaluations)
    }

    /// The reason to stop now, if there is one.
    ///
    /// `n_splittable` is the number of boxes that can still be split.
    pub fn check(&self, counters: &RunCounters, n_splittable: usize) -> Option<ExitStatus> {
        if self.evaluations_exhausted(counters) {
            Some(ExitStatus::EvaluationBudgetExceeded)
        } else if n_splittable == 0 {
            Some(ExitStatus::NormalCompletion)
        } else if counters.sweeps >= self.nsweeps {
            Some(ExitStatus::SweepBudgetExceeded)
        } else {
            None
        }
    }

    pub fn should_stop(&self, counters: &RunCounters, n_splittable: usize) -> bool {
        self.check(counters, n_splittable).is_some()
    }

    /// Status to report once the driver has stopped.
    ///
    /// A driver only stops when [`check`](Self::check) fires, so this falls back to
    /// `NormalCompletion` only if called early.
    pub fn final_status(&self, counters: &RunCounters, n_splittable: usize) -> ExitStatus {
        self.check(counters, n_splittable)
            .unwrap_or(ExitStatus::NormalCompletion)
    }
}
