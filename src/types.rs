//! Core type definitions: the objective capability, run options and the result
//! aggregate.

use std::fmt;

use nalgebra::DMatrix;

use crate::error::{ExitStatus, McsError, Result};

// ──────────────────────────────────────────────────────────────────────────────
// Type Aliases
// ──────────────────────────────────────────────────────────────────────────────

/// Bounds for each dimension: `Vec<(lower, upper)>`.
pub type Bounds = Vec<(f64, f64)>;

// ──────────────────────────────────────────────────────────────────────────────
// Objective
// ──────────────────────────────────────────────────────────────────────────────

/// The function being minimized.
///
/// Treated as a black box: it is called synchronously, one point at a time, with
/// points in the caller's coordinates. Non-finite return values are allowed and are
/// ranked as `+inf`.
///
/// Every `FnMut(&[f64]) -> f64` is an objective, so plain closures work directly.
/// Implement the trait on a struct for stateful objectives.
pub trait Objective {
    /// Evaluate the objective at `x` (length `n`).
    fn evaluate(&mut self, x: &[f64]) -> f64;
}

impl<F> Objective for F
where
    F: FnMut(&[f64]) -> f64,
{
    fn evaluate(&mut self, x: &[f64]) -> f64 {
        self(x)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Options
// ──────────────────────────────────────────────────────────────────────────────

/// Default local-search cadence: one local search every 50 splits.
pub const DEFAULT_LOCAL: usize = 50;

/// Default relative tolerance used to decide that two local minima coincide.
pub const DEFAULT_MINIMA_TOL: f64 = 1e-4;

/// Default radius (unit-cube distance) around a known minimum in which no new local
/// search is started.
pub const DEFAULT_BASIN_RADIUS: f64 = 0.1;

/// Configuration for an MCS run.
///
/// Budgets left as `None` are derived from the dimension `n` when the run is set up:
/// `nsweeps = 3n`, `nf = 50n²`, `smax = 5n + 10`.
#[derive(Debug, Clone)]
pub struct McsOptions {
    /// Maximum number of sweeps (`nsweeps`).
    pub max_sweeps: Option<usize>,

    /// Maximum number of objective evaluations (`nf`).
    pub max_feval: Option<usize>,

    /// Run a local search after every `local` box splits. 0 disables local search.
    pub local: usize,

    /// Sufficient-decrease coefficient for local search steps, in `(0, 1)`.
    pub gamma: f64,

    /// Optional `n × n` symmetric curvature prior, in caller coordinates.
    pub hessian: Option<DMatrix<f64>>,

    /// Maximum box level (`smax`). Boxes at this level are never split.
    pub smax: Option<usize>,

    /// Two local minima whose coordinates all differ by at most
    /// `minima_tol * (upper - lower)` are the same minimum.
    pub minima_tol: f64,

    /// No local search is started from a point closer than this (unit-cube
    /// Euclidean distance) to a known local minimum, and a search ending this close
    /// to one is merged into it.
    pub basin_radius: f64,

    /// Evaluation cap per local search. `None` means `20n + 20`.
    pub local_max_steps: Option<usize>,

    /// Local search stops once its trust radius (unit-cube) falls below this.
    pub local_tol: f64,

    /// Maximum number of distinct local minima kept.
    pub max_minima: usize,
}

impl Default for McsOptions {
    fn default() -> Self {
        Self {
            max_sweeps: None,
            max_feval: None,
            local: DEFAULT_LOCAL,
            gamma: f64::EPSILON,
            hessian: None,
            smax: None,
            minima_tol: DEFAULT_MINIMA_TOL,
            basin_radius: DEFAULT_BASIN_RADIUS,
            local_max_steps: None,
            local_tol: 1e-7,
            max_minima: 100,
        }
    }
}

/// Options with every dimension-dependent default filled in and validated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub nsweeps: usize,
    pub nf: usize,
    pub local: usize,
    pub gamma: f64,
    pub smax: usize,
    pub minima_tol: f64,
    pub basin_radius: f64,
    pub local_max_steps: usize,
    pub local_tol: f64,
    pub max_minima: usize,
}

impl McsOptions {
    /// Resolve defaults for an `n`-dimensional problem and validate every option,
    /// including the shape and symmetry of the Hessian prior.
    pub fn resolve(&self, n: usize) -> Result<RunConfig> {
        if n == 0 {
            return Err(McsError::InvalidArgs("dimension must be >= 1".into()));
        }
        let nsweeps = self.max_sweeps.unwrap_or(3 * n);
        let nf = self.max_feval.unwrap_or(50 * n * n);
        let smax = self.smax.unwrap_or(5 * n + 10);
        if nf == 0 {
            return Err(McsError::InvalidBudget("nf"));
        }
        if nsweeps == 0 {
            return Err(McsError::InvalidBudget("nsweeps"));
        }
        if smax == 0 {
            return Err(McsError::InvalidBudget("smax"));
        }
        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(McsError::InvalidArgs(format!(
                "gamma must lie in (0, 1), got {}",
                self.gamma
            )));
        }
        if !(self.minima_tol >= 0.0 && self.minima_tol.is_finite()) {
            return Err(McsError::InvalidArgs(format!(
                "minima_tol must be finite and >= 0, got {}",
                self.minima_tol
            )));
        }
        if !(self.basin_radius >= 0.0 && self.basin_radius.is_finite()) {
            return Err(McsError::InvalidArgs(format!(
                "basin_radius must be finite and >= 0, got {}",
                self.basin_radius
            )));
        }
        if !(self.local_tol > 0.0 && self.local_tol.is_finite()) {
            return Err(McsError::InvalidArgs(format!(
                "local_tol must be finite and > 0, got {}",
                self.local_tol
            )));
        }
        if self.max_minima == 0 {
            return Err(McsError::InvalidArgs("max_minima must be >= 1".into()));
        }
        if let Some(h) = &self.hessian {
            validate_hessian(h, n)?;
        }

        Ok(RunConfig {
            nsweeps,
            nf,
            local: self.local,
            gamma: self.gamma,
            smax,
            minima_tol: self.minima_tol,
            basin_radius: self.basin_radius,
            local_max_steps: self.local_max_steps.unwrap_or(20 * n + 20).max(1),
            local_tol: self.local_tol,
            max_minima: self.max_minima,
        })
    }
}

/// Check that a Hessian prior is `n × n`, finite and symmetric.
pub fn validate_hessian(h: &DMatrix<f64>, n: usize) -> Result<()> {
    if h.nrows() != n || h.ncols() != n {
        return Err(McsError::InvalidHessian(format!(
            "expected {n}x{n}, got {}x{}",
            h.nrows(),
            h.ncols()
        )));
    }
    if h.iter().any(|v| !v.is_finite()) {
        return Err(McsError::InvalidHessian("entries must be finite".into()));
    }
    let scale = h.amax().max(1.0);
    for i in 0..n {
        for j in (i + 1)..n {
            if (h[(i, j)] - h[(j, i)]).abs() > 1e-10 * scale {
                return Err(McsError::InvalidHessian(format!(
                    "not symmetric at ({i}, {j})"
                )));
            }
        }
    }
    Ok(())
}

// ──────────────────────────────────────────────────────────────────────────────
// Result
// ──────────────────────────────────────────────────────────────────────────────

/// A distinct local minimum found by local search.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMinimum {
    /// Location (caller coordinates).
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub fun: f64,
}

/// Result of an MCS run. Owns all of its data.
#[derive(Debug, Clone)]
pub struct McsResult {
    /// Best point found (dimension n).
    pub x: Vec<f64>,

    /// Best function value found.
    pub fun: f64,

    /// Distinct local minima, sorted by ascending value.
    pub local_minima: Vec<LocalMinimum>,

    /// Total number of objective evaluations.
    pub nfev: usize,

    /// Number of local searches performed.
    pub nloc: usize,

    /// Objective evaluations spent inside local searches.
    pub nloc_evals: usize,

    /// Number of completed sweeps.
    pub nsweep: usize,

    /// Why the run stopped.
    pub exit_status: ExitStatus,

    /// Human-readable message describing the termination reason.
    pub message: String,
}

impl McsResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x: Vec<f64>,
        fun: f64,
        local_minima: Vec<LocalMinimum>,
        nfev: usize,
        nloc: usize,
        nloc_evals: usize,
        nsweep: usize,
        exit_status: ExitStatus,
    ) -> Self {
        let message = format!("{}", exit_status);
        Self {
            x,
            fun,
            local_minima,
            nfev,
            nloc,
            nloc_evals,
            nsweep,
            exit_status,
            message,
        }
    }

    /// Every run that got past configuration is a successful run.
    pub fn success(&self) -> bool {
        true
    }

    /// Points of the local minima, parallel to [`minima_values`](Self::minima_values).
    pub fn minima_points(&self) -> Vec<Vec<f64>> {
        self.local_minima.iter().map(|m| m.x.clone()).collect()
    }

    /// Values of the local minima, parallel to [`minima_points`](Self::minima_points).
    pub fn minima_values(&self) -> Vec<f64> {
        self.local_minima.iter().map(|m| m.fun).collect()
    }
}

impl fmt::Display for McsResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "McsResult {{")?;
        writeln!(f, "  message: {}", self.message)?;
        writeln!(f, "  fun: {:.15e}", self.fun)?;
        write!(f, "  x: [")?;
        for (i, xi) in self.x.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.15e}", xi)?;
        }
        writeln!(f, "]")?;
        writeln!(f, "  local_minima: {}", self.local_minima.len())?;
        writeln!(f, "  nfev: {}", self.nfev)?;
        writeln!(f, "  nloc: {} ({} evaluations)", self.nloc, self.nloc_evals)?;
        writeln!(f, "  nsweep: {}", self.nsweep)?;
        writeln!(f, "  exit_status: {:?}", self.exit_status)?;
        write!(f, "}}")
    }
}
