//! # MCS-RS: Multilevel Coordinate Search in Rust
//!
//! Derivative-free global minimization of a black-box function over a box
//! `lower <= x <= upper`.
//!
//! ## Overview
//!
//! The search space is recursively split into smaller boxes, one coordinate at a
//! time. Every box carries one evaluated representative point and a level, its depth
//! in the splitting hierarchy. A sweep visits the levels from coarse to fine and splits
//! the most promising box of each level, so coarse structure is resolved cheaply
//! before budget is spent on fine detail. Split boundaries are biased toward the
//! lower function values (golden-section rule, corrected by quadratic interpolation).
//!
//! Every `local` splits, the best box that has not yet been refined is polished by a
//! trust-region local search. Its end point is kept in a de-duplicated list of local
//! minima, reported with the global best.
//!
//! A run ends when the evaluation budget `nf` is used up, when `nsweeps` sweeps have
//! completed, or when no box can be split any more. Running out of budget is a normal
//! outcome, reported through [`ExitStatus`]; only malformed configuration is an error.
//!
//! ## Example
//!
//! ```
//! use mcs::McsBuilder;
//!
//! let result = McsBuilder::new(|x: &[f64]| (x[0] - 0.3).powi(2), vec![(0.0, 1.0)])
//!     .max_feval(200)
//!     .max_sweeps(50)
//!     .minimize()
//!     .unwrap();
//! assert!((result.x[0] - 0.3).abs() < 1e-2);
//! ```
//!
//! ## References
//!
//! - Huyer, W. & Neumaier, A. "Global Optimization by Multilevel Coordinate Search."
//!   Journal of Global Optimization 14, 331–355 (1999).

pub mod error;
pub mod incumbent;
pub mod local;
pub mod mcs;
pub mod split;
pub mod storage;
pub mod termination;
pub mod trace;
pub mod types;

// Re-export main types
pub use error::{ExitStatus, McsError, Result};
pub use mcs::{DriverState, Mcs};
pub use trace::TraceWriter;
pub use types::{Bounds, LocalMinimum, McsOptions, McsResult, Objective};

use nalgebra::DMatrix;

/// Fluent configuration of an MCS run.
///
/// ```
/// use mcs::McsBuilder;
///
/// let result = McsBuilder::new(
///     |x: &[f64]| (x[0] - 1.0).powi(2) + (x[1] + 0.5).powi(2),
///     vec![(-2.0, 2.0), (-2.0, 2.0)],
/// )
/// .max_feval(500)
/// .max_sweeps(100)
/// .local(10)
/// .minimize()
/// .unwrap();
/// assert!(result.fun < 1e-4);
/// ```
pub struct McsBuilder<F: Objective> {
    objective: F,
    bounds: Bounds,
    options: McsOptions,
}

impl<F: Objective> McsBuilder<F> {
    pub fn new(objective: F, bounds: Bounds) -> Self {
        Self {
            objective,
            bounds,
            options: McsOptions::default(),
        }
    }

    /// Maximum number of sweeps (`nsweeps`). Default `3n`.
    pub fn max_sweeps(mut self, n: usize) -> Self {
        self.options.max_sweeps = Some(n);
        self
    }

    /// Maximum number of objective evaluations (`nf`). Default `50n²`.
    pub fn max_feval(mut self, n: usize) -> Self {
        self.options.max_feval = Some(n);
        self
    }

    /// Run a local search every `n` splits; 0 disables local search. Default 50.
    pub fn local(mut self, n: usize) -> Self {
        self.options.local = n;
        self
    }

    /// Sufficient-decrease coefficient in `(0, 1)`. Default `f64::EPSILON`.
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.options.gamma = gamma;
        self
    }

    /// Curvature prior for local search, `n × n` symmetric, in caller coordinates.
    pub fn hessian(mut self, h: DMatrix<f64>) -> Self {
        self.options.hessian = Some(h);
        self
    }

    /// Maximum box level (`smax`). Default `5n + 10`.
    pub fn smax(mut self, smax: usize) -> Self {
        self.options.smax = Some(smax);
        self
    }

    /// Replace all options at once.
    pub fn options(mut self, options: McsOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate and build the run without evaluating anything.
    pub fn build(self) -> Result<Mcs<F>> {
        Mcs::new(self.objective, &self.bounds, self.options)
    }

    /// Build and run to completion.
    pub fn minimize(self) -> Result<McsResult> {
        let mut run = self.build()?;
        Ok(run.minimize())
    }
}
