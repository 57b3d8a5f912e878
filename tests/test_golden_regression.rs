//! Determinism regression suite.
//!
//! Each standard test function is run twice with identical configuration. The two
//! results are serialized to JSON and must match byte for byte: there is no hidden
//! randomness and the evaluation order is fixed.

use serde::{Deserialize, Serialize};

use mcs::{Bounds, McsBuilder, McsOptions, McsResult};

// ─────────────────────────────────────────────────────────────────────────────
// Golden record
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GoldenResult {
    /// Test function name
    function: String,
    /// Dimension of the problem
    dimension: usize,
    /// Evaluation budget
    max_feval: usize,
    /// Best point found
    x: Vec<f64>,
    /// Best function value
    fun: f64,
    /// Local minima values, best first
    minima: Vec<f64>,
    /// Number of function evaluations
    nfev: usize,
    /// Number of local searches
    nloc: usize,
    /// Completed sweeps
    nsweep: usize,
    /// Exit status as integer
    exit_status: i32,
}

impl GoldenResult {
    fn from_result(function: &str, max_feval: usize, r: &McsResult) -> Self {
        Self {
            function: function.to_string(),
            dimension: r.x.len(),
            max_feval,
            x: r.x.clone(),
            fun: r.fun,
            minima: r.minima_values(),
            nfev: r.nfev,
            nloc: r.nloc,
            nsweep: r.nsweep,
            exit_status: r.exit_status.code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Test functions
// ─────────────────────────────────────────────────────────────────────────────

fn sphere(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

fn rosenbrock(x: &[f64]) -> f64 {
    x.windows(2)
        .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (1.0 - w[0]).powi(2))
        .sum()
}

fn rastrigin(x: &[f64]) -> f64 {
    10.0 * x.len() as f64
        + x.iter()
            .map(|v| v * v - 10.0 * (2.0 * std::f64::consts::PI * v).cos())
            .sum::<f64>()
}

fn branin(x: &[f64]) -> f64 {
    use std::f64::consts::PI;
    let (a, b, c) = (1.0, 5.1 / (4.0 * PI * PI), 5.0 / PI);
    let (r, s, t) = (6.0, 10.0, 1.0 / (8.0 * PI));
    a * (x[1] - b * x[0] * x[0] + c * x[0] - r).powi(2) + s * (1.0 - t) * x[0].cos() + s
}

struct Case {
    name: &'static str,
    f: fn(&[f64]) -> f64,
    bounds: Bounds,
    max_feval: usize,
}

fn cases() -> Vec<Case> {
    vec![
        Case {
            name: "sphere_3d",
            f: sphere,
            bounds: vec![(-5.0, 7.0); 3],
            max_feval: 400,
        },
        Case {
            name: "rosenbrock_2d",
            f: rosenbrock,
            bounds: vec![(-2.0, 2.0); 2],
            max_feval: 600,
        },
        Case {
            name: "rastrigin_2d",
            f: rastrigin,
            bounds: vec![(-5.12, 5.12); 2],
            max_feval: 500,
        },
        Case {
            name: "branin",
            f: branin,
            bounds: vec![(-5.0, 10.0), (0.0, 15.0)],
            max_feval: 300,
        },
    ]
}

fn run_case(case: &Case) -> GoldenResult {
    let opts = McsOptions {
        max_feval: Some(case.max_feval),
        max_sweeps: Some(1000),
        local: 10,
        ..Default::default()
    };
    let result = McsBuilder::new(case.f, case.bounds.clone())
        .options(opts)
        .minimize()
        .unwrap();
    GoldenResult::from_result(case.name, case.max_feval, &result)
}

#[test]
fn test_repeated_runs_are_identical() {
    for case in cases() {
        let first = serde_json::to_string_pretty(&run_case(&case)).unwrap();
        let second = serde_json::to_string_pretty(&run_case(&case)).unwrap();
        assert_eq!(first, second, "{} is not deterministic", case.name);
    }
}

#[test]
fn test_golden_record_roundtrip() {
    for case in cases() {
        let golden = run_case(&case);
        let json = serde_json::to_string(&golden).unwrap();
        let back: GoldenResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, golden);
        assert!(golden.nfev <= golden.max_feval);
        assert_eq!(golden.x.len(), golden.dimension);
    }
}

#[test]
fn test_golden_values_are_sensible() {
    for case in cases() {
        let golden = run_case(&case);
        match case.name {
            "sphere_3d" => assert!(golden.fun < 1e-4, "{golden:?}"),
            "branin" => assert!(golden.fun < 0.45, "{golden:?}"),
            // The center (0, 0) scores 1; anything found must beat it.
            "rosenbrock_2d" => assert!(golden.fun < 1.0, "{golden:?}"),
            // The center is the global minimum.
            "rastrigin_2d" => assert_eq!(golden.fun, 0.0),
            _ => unreachable!(),
        }
    }
}
