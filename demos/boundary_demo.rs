//! A six-dimensional run with a flat objective and an all-ones curvature prior.
//!
//! Exercises the full configuration surface: explicit budgets, local-search cadence,
//! descent coefficient, Hessian prior and maximum level.

use nalgebra::DMatrix;

use mcs::{McsBuilder, McsError};

fn flat(_x: &[f64]) -> f64 {
    -123456.0
}

fn main() -> Result<(), McsError> {
    env_logger::init();

    let n = 6;
    let bounds = vec![(0.0, 10.0); n];

    println!("Starting MCS optimization...");
    let result = McsBuilder::new(flat, bounds)
        .max_sweeps(100)
        .max_feval(1000)
        .local(20)
        .gamma(0.5)
        .hessian(DMatrix::from_element(n, n, 1.0))
        .smax(20)
        .minimize()?;

    println!("fbest: {}", result.fun);
    println!(
        "nfev: {}  nloc: {}  nsweep: {}  status: {} ({})",
        result.nfev,
        result.nloc,
        result.nsweep,
        result.exit_status.code(),
        result.message
    );
    Ok(())
}
