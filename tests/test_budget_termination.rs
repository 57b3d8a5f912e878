//! Termination tests: every run ends with exactly one exit status, and the evaluation
//! budget is never exceeded.

use std::cell::Cell;
use std::rc::Rc;

use mcs::{ExitStatus, McsBuilder, McsOptions, Objective};

fn sphere(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

fn shifted_quadratic(x: &[f64]) -> f64 {
    (x[0] - 0.3).powi(2)
}

/// Objective that counts its own calls.
struct Counting<F> {
    inner: F,
    calls: Rc<Cell<usize>>,
}

impl<F: Fn(&[f64]) -> f64> Objective for Counting<F> {
    fn evaluate(&mut self, x: &[f64]) -> f64 {
        self.calls.set(self.calls.get() + 1);
        (self.inner)(x)
    }
}

#[test]
fn test_single_evaluation_budget() {
    let result = McsBuilder::new(shifted_quadratic, vec![(0.0, 1.0)])
        .max_feval(1)
        .minimize()
        .unwrap();
    assert_eq!(result.exit_status, ExitStatus::EvaluationBudgetExceeded);
    assert_eq!(result.nfev, 1);
    assert_eq!(result.nsweep, 0);
    assert_eq!(result.x, vec![0.5]);
    assert!((result.fun - 0.04).abs() < 1e-15);
    assert!(result.local_minima.is_empty());
}

#[test]
fn test_single_sweep_budget() {
    let result = McsBuilder::new(shifted_quadratic, vec![(0.0, 1.0)])
        .max_feval(500)
        .max_sweeps(1)
        .minimize()
        .unwrap();
    assert_eq!(result.exit_status, ExitStatus::SweepBudgetExceeded);
    assert_eq!(result.nsweep, 1);
    assert!(result.nfev > 1);
}

#[test]
fn test_space_exhausted_in_one_sweep() {
    // With smax = 1 the root's children are terminal at once.
    let result = McsBuilder::new(shifted_quadratic, vec![(0.0, 1.0)])
        .max_feval(500)
        .max_sweeps(1)
        .smax(1)
        .minimize()
        .unwrap();
    assert_eq!(result.exit_status, ExitStatus::NormalCompletion);
    assert_eq!(result.nsweep, 1);
    assert_eq!(result.nfev, 3);
}

#[test]
fn test_small_smax_exhausts_partition() {
    let mut run = McsBuilder::new(sphere, vec![(-1.0, 2.0), (-1.0, 2.0)])
        .max_feval(100_000)
        .max_sweeps(100_000)
        .smax(4)
        .local(0)
        .build()
        .unwrap();
    let result = run.minimize();
    assert_eq!(result.exit_status, ExitStatus::NormalCompletion);
    assert_eq!(run.store().n_splittable(), 0);
    assert!(run.store().is_exhausted());
    assert_eq!(run.store().verify_tiling(), None);
}

#[test]
fn test_evaluations_never_exceed_budget() {
    for nf in [1, 2, 3, 5, 17, 64, 150, 333] {
        for local in [0, 1, 5] {
            let calls = Rc::new(Cell::new(0));
            let obj = Counting {
                inner: |x: &[f64]| (x[0] - 0.2).powi(2) + (x[1] - 0.9).abs() + x[2].sin(),
                calls: Rc::clone(&calls),
            };
            let result = McsBuilder::new(obj, vec![(0.0, 1.0); 3])
                .options(McsOptions {
                    max_feval: Some(nf),
                    max_sweeps: Some(1000),
                    local,
                    ..Default::default()
                })
                .minimize()
                .unwrap();
            assert!(result.nfev <= nf, "nf = {nf}, local = {local}");
            assert_eq!(result.nfev, calls.get());
            assert!(result.nloc_evals <= result.nfev);
            if nf <= 64 {
                assert_eq!(result.exit_status, ExitStatus::EvaluationBudgetExceeded);
                assert_eq!(result.nfev, nf);
            }
        }
    }
}

#[test]
fn test_default_budgets_follow_dimension() {
    let run = McsBuilder::new(sphere, vec![(-1.0, 1.0); 3]).build().unwrap();
    assert_eq!(run.config().nsweeps, 9);
    assert_eq!(run.config().nf, 450);
    assert_eq!(run.config().smax, 25);
    assert_eq!(run.config().local, 50);
}

#[test]
fn test_default_run_stops_within_default_budget() {
    let result = McsBuilder::new(sphere, vec![(-1.0, 2.0); 2])
        .minimize()
        .unwrap();
    assert!(result.nfev <= 200);
    assert!(result.nsweep <= 6);
    assert!(result.success());
}

#[test]
fn test_local_zero_disables_local_search() {
    let result = McsBuilder::new(sphere, vec![(-1.0, 2.0); 2])
        .max_feval(300)
        .max_sweeps(100)
        .local(0)
        .minimize()
        .unwrap();
    assert_eq!(result.nloc, 0);
    assert_eq!(result.nloc_evals, 0);
    assert!(result.local_minima.is_empty());
}

#[test]
fn test_local_cadence_runs_searches() {
    let result = McsBuilder::new(sphere, vec![(-1.0, 2.0); 2])
        .max_feval(600)
        .max_sweeps(200)
        .local(5)
        .minimize()
        .unwrap();
    assert!(result.nloc >= 1);
    assert!(result.nloc_evals >= 1);
    assert!(!result.local_minima.is_empty());
}
