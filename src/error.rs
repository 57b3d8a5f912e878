//! Error and exit-status types for the MCS implementation.
//!
//! Configuration problems are the only hard failures and are reported before the
//! objective is ever called. Running out of budget is a normal way for a run to end
//! and is reported through [`ExitStatus`].

use std::fmt;

use thiserror::Error;

/// Why a run stopped.
///
/// Exactly one status is assigned per run. The integer codes (0, 1, 2) are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// No box is left that can be split: every box is retired or at `smax`.
    NormalCompletion = 0,
    /// The evaluation budget `nf` was used up.
    EvaluationBudgetExceeded = 1,
    /// The sweep budget `nsweeps` was used up.
    SweepBudgetExceeded = 2,
}

impl ExitStatus {
    /// Returns true if the run ended because one of its budgets ran out.
    pub fn is_budget_exhausted(&self) -> bool {
        !matches!(self, Self::NormalCompletion)
    }

    /// Integer code of this status.
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Convert from the integer code.
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::NormalCompletion),
            1 => Some(Self::EvaluationBudgetExceeded),
            2 => Some(Self::SweepBudgetExceeded),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NormalCompletion => write!(f, "Search space exhausted"),
            Self::EvaluationBudgetExceeded => write!(f, "Maximum function evaluations reached"),
            Self::SweepBudgetExceeded => write!(f, "Maximum number of sweeps reached"),
        }
    }
}

/// Configuration errors, detected before any objective evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum McsError {
    #[error("Invalid bounds: lower bound >= upper bound in dimension {dim}")]
    InvalidBounds { dim: usize },

    #[error("Invalid budget: {0} must be at least 1")]
    InvalidBudget(&'static str),

    #[error("Invalid Hessian prior: {0}")]
    InvalidHessian(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
}

/// Result type alias for MCS operations.
pub type Result<T> = std::result::Result<T, McsError>;
