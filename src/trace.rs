//! Event trace for step-by-step inspection of a run.
//!
//! When the `trace` feature is enabled, the driver writes one tagged line per event
//! to a [`TraceWriter`] attached with [`Mcs::with_tracer`](crate::Mcs::with_tracer).
//! Without the feature the `trace_write!` macro expands to nothing.
//!
//! ```text
//! TRACE INIT center_f=<val> nfev=<n>
//! TRACE SPLIT box=<id> level=<s> dim=<i> children=<k> edges=[..]
//! TRACE LOCAL box=<id> f0=<val> f=<val> evals=<n> converged=<bool> new=<bool>
//! TRACE SWEEP k=<n> splits=<n> best=<val> nfev=<n>
//! TRACE END status=<code> fun=<val> nfev=<n> nsweep=<n> nloc=<n>
//! ```

use std::fmt::Write as FmtWrite;
use std::sync::{Mutex, MutexGuard};

/// A thread-safe buffer of trace lines.
#[derive(Debug, Default)]
pub struct TraceWriter {
    lines: Mutex<Vec<String>>,
}

impl TraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored: every push completes before the guard drops.
    fn buffer(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append one line.
    pub fn write_line(&self, line: &str) {
        self.buffer().push(line.to_string());
    }

    /// Append one line built from format args.
    pub fn write_fmt(&self, args: std::fmt::Arguments<'_>) {
        let mut line = String::new();
        let _ = line.write_fmt(args);
        self.buffer().push(line);
    }

    /// All lines so far.
    pub fn lines(&self) -> Vec<String> {
        self.buffer().clone()
    }

    /// Whole trace, newline-terminated.
    pub fn output(&self) -> String {
        self.buffer().iter().fold(String::new(), |mut out, l| {
            out.push_str(l);
            out.push('\n');
            out
        })
    }

    /// Number of lines starting with `TRACE <tag>`.
    pub fn count(&self, tag: &str) -> usize {
        let prefix = format!("TRACE {tag}");
        self.buffer()
            .iter()
            .filter(|l| l.starts_with(&prefix))
            .count()
    }
}

/// Write a trace line (only active with the `trace` feature).
#[cfg(feature = "trace")]
#[macro_export]
macro_rules! trace_write {
    ($tracer:expr, $($arg:tt)*) => {
        if let Some(ref tw) = $tracer {
            tw.write_fmt(format_args!($($arg)*));
        }
    };
}

/// No-op when the trace feature is disabled.
#[cfg(not(feature = "trace"))]
#[macro_export]
macro_rules! trace_write {
    ($tracer:expr, $($arg:tt)*) => {};
}
