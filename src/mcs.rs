//! Sweep driver: scaling, budgeted evaluation and the main control loop.
//!
//! The driver works in normalized coordinates `[0, 1]^n`. Every call to the objective
//! goes through [`Evaluator::evaluate`], which maps the point back to the caller's
//! box, enforces the evaluation budget and feeds the incumbent tracker.
//!
//! | Stage                   | Where                                   |
//! |-------------------------|-----------------------------------------|
//! | validation, scaling     | [`Mcs::new`]                            |
//! | root box                | [`Mcs::initialize`]                     |
//! | one pass over levels    | [`Mcs::sweep`]                          |
//! | box splitting           | [`crate::split::split_box`]             |
//! | local refinement        | [`crate::local::LocalSearch`]           |
//! | stopping rules          | [`crate::termination::Termination`]     |

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};

use crate::error::{McsError, Result};
use crate::incumbent::IncumbentSet;
use crate::local::LocalSearch;
use crate::split::{split_box, SplitOutcome};
use crate::storage::{BoxState, McsBox, PartitionStore};
use crate::termination::{RunCounters, Termination};
use crate::trace::TraceWriter;
use crate::types::{Bounds, LocalMinimum, McsOptions, McsResult, Objective, RunConfig};

/// Owns the objective and everything that changes when it is called.
///
/// Splitting and local search both evaluate through this type, so budget accounting
/// and incumbent updates happen in exactly one place.
pub struct Evaluator<F: Objective> {
    objective: F,
    lower: Vec<f64>,
    upper: Vec<f64>,
    width: Vec<f64>,
    scratch: Vec<f64>,
    pub counters: RunCounters,
    pub termination: Termination,
    pub incumbent: IncumbentSet,
    in_local: bool,
    #[cfg_attr(not(feature = "trace"), allow(dead_code))]
    pub(crate) tracer: Option<Arc<TraceWriter>>,
}

impl<F: Objective> Evaluator<F> {
    fn new(objective: F, bounds: &Bounds, cfg: &RunConfig) -> Self {
        let lower: Vec<f64> = bounds.iter().map(|b| b.0).collect();
        let upper: Vec<f64> = bounds.iter().map(|b| b.1).collect();
        let width = lower.iter().zip(&upper).map(|(l, u)| u - l).collect();
        Self {
            objective,
            scratch: vec![0.0; lower.len()],
            lower,
            upper,
            width,
            counters: RunCounters::default(),
            termination: Termination::new(cfg.nf, cfg.nsweeps),
            incumbent: IncumbentSet::new(cfg.minima_tol, cfg.basin_radius, cfg.max_minima),
            in_local: false,
            tracer: None,
        }
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// Side lengths of the caller's box.
    pub fn width(&self) -> &[f64] {
        &self.width
    }

    /// Map a normalized point to caller coordinates.
    ///
    /// `x[i] = lower[i] + u[i] * (upper[i] - lower[i])`, kept inside `[lower, upper]`
    /// so rounding never produces a point outside the caller's bounds.
    #[inline]
    pub fn to_actual(&self, u: &[f64], x: &mut [f64]) {
        debug_assert_eq!(u.len(), self.dim());
        for i in 0..self.dim() {
            x[i] = (self.lower[i] + u[i] * self.width[i]).clamp(self.lower[i], self.upper[i]);
        }
    }

    /// Returns true if the evaluation budget is used up.
    #[inline]
    pub fn exhausted(&self) -> bool {
        self.termination.evaluations_exhausted(&self.counters)
    }

    /// Evaluations still allowed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.termination.evaluations_left(&self.counters)
    }

    /// Evaluate the objective at a normalized point.
    ///
    /// Returns `None` without calling the objective once the budget is exhausted.
    /// Otherwise the raw value is returned (non-finite values included) and the point
    /// is offered to the incumbent tracker.
    pub fn evaluate(&mut self, u: &[f64]) -> Option<f64> {
        if self.exhausted() {
            return None;
        }
        let mut x = std::mem::take(&mut self.scratch);
        self.to_actual(u, &mut x);
        let f = self.objective.evaluate(&x);
        self.scratch = x;

        self.counters.evaluations += 1;
        if self.in_local {
            self.counters.local_evaluations += 1;
        }
        self.incumbent.observe(u, f);
        Some(f)
    }

    /// Attribute subsequent evaluations to local search (or stop doing so).
    pub(crate) fn set_local(&mut self, on: bool) {
        self.in_local = on;
    }

    fn actual_point(&self, u: &[f64]) -> Vec<f64> {
        let mut x = vec![0.0; self.dim()];
        self.to_actual(u, &mut x);
        x
    }
}

/// Externally visible phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Constructed; nothing evaluated yet.
    Idle,
    /// Sweeping.
    SweepInProgress,
    /// A stopping rule fired. Further calls to [`Mcs::minimize`] return the same
    /// result without evaluating anything.
    Completed,
}

/// An MCS run.
///
/// ```
/// use mcs::{Mcs, McsOptions};
///
/// let bounds = vec![(-2.0, 2.0), (-2.0, 2.0)];
/// let opts = McsOptions { max_feval: Some(400), ..Default::default() };
/// let mut run = Mcs::new(|x: &[f64]| x[0] * x[0] + x[1] * x[1], &bounds, opts).unwrap();
/// let result = run.minimize();
/// assert!(result.fun < 1e-3);
/// ```
pub struct Mcs<F: Objective> {
    evaluator: Evaluator<F>,
    store: PartitionStore,
    config: RunConfig,
    local: Option<LocalSearch>,
    /// Boxes whose representative a local search has started from.
    refined: HashSet<usize>,
    state: DriverState,
}

impl<F: Objective> Mcs<F> {
    /// Validate the problem and set up a run. Nothing is evaluated here.
    ///
    /// # Errors
    /// - `McsError::InvalidArgs` for an empty or non-finite box, or an invalid option.
    /// - `McsError::InvalidBounds` if `lower >= upper` in some dimension.
    /// - `McsError::InvalidBudget` if `nf`, `nsweeps` or `smax` is zero.
    /// - `McsError::InvalidHessian` for a malformed curvature prior.
    pub fn new(objective: F, bounds: &Bounds, options: McsOptions) -> Result<Self> {
        let n = bounds.len();
        if n == 0 {
            return Err(McsError::InvalidArgs("bounds must not be empty".into()));
        }
        for (dim, &(lo, hi)) in bounds.iter().enumerate() {
            if !lo.is_finite() || !hi.is_finite() {
                return Err(McsError::InvalidArgs(format!(
                    "bounds must be finite in dimension {dim}"
                )));
            }
            if lo >= hi {
                return Err(McsError::InvalidBounds { dim });
            }
            if !(hi - lo).is_finite() {
                return Err(McsError::InvalidArgs(format!(
                    "bound width overflows in dimension {dim}"
                )));
            }
        }
        let config = options.resolve(n)?;
        let evaluator = Evaluator::new(objective, bounds, &config);
        let local = (config.local > 0).then(|| {
            LocalSearch::new(&config, options.hessian.as_ref(), evaluator.width())
        });

        Ok(Self {
            store: PartitionStore::new(n, config.smax),
            evaluator,
            config,
            local,
            refined: HashSet::new(),
            state: DriverState::Idle,
        })
    }

    /// Attach a trace buffer. Lines are only written with the `trace` feature.
    pub fn with_tracer(mut self, tracer: Arc<TraceWriter>) -> Self {
        self.evaluator.tracer = Some(tracer);
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn store(&self) -> &PartitionStore {
        &self.store
    }

    pub fn counters(&self) -> &RunCounters {
        &self.evaluator.counters
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    #[cfg(test)]
    pub(crate) fn evaluator_mut(&mut self) -> &mut Evaluator<F> {
        &mut self.evaluator
    }

    /// Evaluate the center of the search space and make it the level-0 root box.
    ///
    /// Does nothing unless the run is still idle.
    pub fn initialize(&mut self) {
        if self.state != DriverState::Idle {
            return;
        }
        let n = self.store.dim;
        info!(
            "MCS start: n={} nf={} nsweeps={} smax={} local={}",
            n, self.config.nf, self.config.nsweeps, self.config.smax, self.config.local
        );
        let center = vec![0.5; n];
        // nf >= 1, so the first evaluation is always granted.
        let f = self.evaluator.evaluate(&center).unwrap_or(f64::INFINITY);
        self.store.insert(McsBox::new(
            None,
            0,
            vec![0.0; n],
            vec![1.0; n],
            center,
            f,
            0,
        ));
        crate::trace_write!(
            self.evaluator.tracer,
            "TRACE INIT center_f={:.15e} nfev={}",
            f,
            self.evaluator.counters.evaluations
        );
        self.state = DriverState::SweepInProgress;
    }

    /// Run one sweep over levels `0..smax`.
    ///
    /// The best box of the lowest non-empty level is always split. A best box at a
    /// deeper level is split only if its value is strictly below every value split
    /// earlier in this sweep. Returns true if the sweep ran to its end; only such
    /// sweeps are counted.
    pub fn sweep(&mut self) -> bool {
        let mut record: Option<f64> = None;
        let mut splits = 0usize;

        for level in 0..self.store.smax {
            let Some(id) = self.store.best_at_level(level) else {
                continue;
            };
            let value = self.store.get(id).rank_value();
            if record.is_some_and(|r| value >= r) {
                continue;
            }
            match split_box(&mut self.store, id, &mut self.evaluator) {
                SplitOutcome::Split { .. } => {
                    self.carry_refined(id);
                    record = Some(value);
                    splits += 1;
                    self.after_split();
                }
                SplitOutcome::Terminal => {}
                SplitOutcome::NoBudget => return false,
            }
            if self.evaluator.exhausted() {
                return false;
            }
        }

        self.evaluator.counters.sweeps += 1;
        debug!(
            "sweep {}: {} splits, best={:.6e}, nfev={}, splittable={}",
            self.evaluator.counters.sweeps,
            splits,
            self.evaluator.incumbent.best_value(),
            self.evaluator.counters.evaluations,
            self.store.n_splittable()
        );
        crate::trace_write!(
            self.evaluator.tracer,
            "TRACE SWEEP k={} splits={} best={:.15e} nfev={}",
            self.evaluator.counters.sweeps,
            splits,
            self.evaluator.incumbent.best_value(),
            self.evaluator.counters.evaluations
        );
        true
    }

    /// Run until a stopping rule fires and return the result.
    pub fn minimize(&mut self) -> McsResult {
        self.initialize();
        while self.state == DriverState::SweepInProgress {
            if self
                .evaluator
                .termination
                .should_stop(&self.evaluator.counters, self.store.n_splittable())
            {
                self.state = DriverState::Completed;
                break;
            }
            self.sweep();
        }
        let result = self.result();
        info!(
            "MCS done: {} (fun={:.6e}, nfev={}, nsweep={}, nloc={})",
            result.message, result.fun, result.nfev, result.nsweep, result.nloc
        );
        crate::trace_write!(
            self.evaluator.tracer,
            "TRACE END status={} fun={:.15e} nfev={} nsweep={} nloc={}",
            result.exit_status.code(),
            result.fun,
            result.nfev,
            result.nsweep,
            result.nloc
        );
        result
    }

    fn after_split(&mut self) {
        let cadence = self.config.local;
        if cadence > 0 && self.evaluator.counters.splits % cadence == 0 {
            self.local_search();
        }
    }

    /// The child of `id` that holds its representative counts as refined if `id` did.
    fn carry_refined(&mut self, id: usize) {
        if !self.refined.contains(&id) {
            return;
        }
        let parent = self.store.get(id);
        let heir = parent
            .children
            .iter()
            .copied()
            .find(|&c| self.store.get(c).x == parent.x);
        if let Some(c) = heir {
            self.refined.insert(c);
        }
    }

    /// Refine the best box that has not been refined and is not inside the basin of
    /// a known local minimum. Only a converged search is recorded as a local minimum.
    fn local_search(&mut self) {
        let Some(searcher) = &self.local else {
            return;
        };
        if self.evaluator.exhausted() {
            return;
        }
        let incumbent = &self.evaluator.incumbent;
        let refined = &self.refined;
        let radius = self.config.basin_radius;
        let Some(id) = self.store.best_matching(|b| {
            b.state != BoxState::Retired
                && !refined.contains(&b.id)
                && b.f.is_finite()
                && !incumbent.near_known_minimum(&b.x, radius)
        }) else {
            return;
        };

        self.refined.insert(id);
        let start = self.store.get(id);
        let (x0, f0, half) = (start.x.clone(), start.f, start.max_half_width());
        let cloud: Vec<(&[f64], f64)> = self
            .store
            .boxes()
            .filter(|b| b.state != BoxState::Retired && b.f.is_finite())
            .map(|b| (b.x.as_slice(), b.f))
            .collect();

        let before = self.evaluator.counters.evaluations;
        self.evaluator.set_local(true);
        let outcome = searcher.run(&mut self.evaluator, &x0, f0, half, &cloud);
        self.evaluator.set_local(false);

        let used = self.evaluator.counters.evaluations - before;
        self.evaluator.counters.local_searches += 1;
        let fresh = outcome.converged()
            && self
                .evaluator
                .incumbent
                .record_local_minimum(&outcome.x, outcome.f);
        debug!(
            "local search {} from box {}: f {:.6e} -> {:.6e} in {} evaluations, {:?}{}",
            self.evaluator.counters.local_searches,
            id,
            f0,
            outcome.f,
            used,
            outcome.stop,
            if fresh { " (new minimum)" } else { "" }
        );
        crate::trace_write!(
            self.evaluator.tracer,
            "TRACE LOCAL box={} f0={:.15e} f={:.15e} evals={} converged={} new={}",
            id,
            f0,
            outcome.f,
            used,
            outcome.converged(),
            fresh
        );
    }

    /// Assemble the result in caller coordinates.
    pub fn result(&self) -> McsResult {
        let ev = &self.evaluator;
        let (x, fun) = match ev.incumbent.best() {
            Some((u, f)) => (ev.actual_point(u), f),
            None => (ev.actual_point(&vec![0.5; self.store.dim]), f64::INFINITY),
        };
        let local_minima = ev
            .incumbent
            .minima()
            .iter()
            .map(|m| LocalMinimum {
                x: ev.actual_point(&m.x),
                fun: m.f,
            })
            .collect();
        let status = ev
            .termination
            .final_status(&ev.counters, self.store.n_splittable());

        McsResult::new(
            x,
            fun,
            local_minima,
            ev.counters.evaluations,
            ev.counters.local_searches,
            ev.counters.local_evaluations,
            ev.counters.sweeps,
            status,
        )
    }
}
