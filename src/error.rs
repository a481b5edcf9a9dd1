//! Error taxonomy for workload execution.
//!
//! Three kinds of failure exist in a run:
//! - [`ConfigError`]: the workload definition is structurally invalid.
//!   Always raised before any worker starts.
//! - [`FixtureError`] with a code on the workload's tolerated list: an
//!   expected consequence of concurrent execution (a peer dropped the
//!   collection mid-read, for example). Swallowed by the worker loop.
//! - Any other [`FixtureError`]: fatal for the raising worker and for the
//!   run as a whole, recorded as a [`WorkerFailure`]. Teardown still runs.

use std::fmt;

use thiserror::Error;

/// A single structural violation found while validating a workload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigViolation {
    /// The start state is not a key of the state map.
    #[error("start state `{0}` is not a declared state")]
    UnknownStartState(String),

    /// A transition row is keyed by a state that does not exist.
    #[error("transition row `{0}` does not match any declared state")]
    UnknownTransitionSource(String),

    /// A transition targets a state that does not exist.
    #[error("transition `{from}` -> `{to}` targets an undeclared state")]
    UnknownTransitionTarget {
        /// Source state of the transition.
        from: String,
        /// Undeclared target state.
        to: String,
    },

    /// A transition weight is negative.
    #[error("transition `{from}` -> `{to}` has negative weight {weight}")]
    NegativeWeight {
        /// Source state of the transition.
        from: String,
        /// Target state of the transition.
        to: String,
        /// The offending weight.
        weight: f64,
    },

    /// A state reachable from the start state has no transition row.
    ///
    /// Terminal states are modeled as self-loops with weight 1, not by
    /// omitting the row.
    #[error("state `{0}` is reachable but has no transition row")]
    MissingTransitionRow(String),

    /// A reachable transition row has no positive-weight entry, so a
    /// worker arriving there would have no successor to pick.
    #[error("transition row `{0}` has no positive-weight entry")]
    NoReachableSuccessor(String),

    /// The workload declares zero worker threads.
    #[error("thread count must be at least 1")]
    ZeroThreads,
}

/// A structurally invalid workload definition.
///
/// Validation collects every violation it can find rather than stopping
/// at the first, so a misconfigured workload is fixable in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    /// All violations found, in detection order.
    pub violations: Vec<ConfigViolation>,
}

impl ConfigError {
    /// Creates an error from a non-empty list of violations.
    #[must_use]
    pub fn new(violations: Vec<ConfigViolation>) -> Self {
        debug_assert!(!violations.is_empty());
        Self { violations }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid workload definition: ")?;
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

/// An error raised by a fixture operation, a state function, or a
/// lifecycle hook.
///
/// The `code` is the classification key: workloads declare the codes they
/// tolerate as expected concurrency errors via
/// [`Workload::tolerated_errors`](crate::Workload::tolerated_errors);
/// every other code is fatal for the raising worker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct FixtureError {
    /// Stable identifier used for expected-error classification.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl FixtureError {
    /// Creates a new fixture error.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A fatal error recorded against one worker.
///
/// Carries everything needed to reproduce the failure together with the
/// run seed reported alongside it: which worker, which state it was
/// executing, and on which iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    /// Id of the worker that raised the error, in `0..thread_count`.
    pub worker_id: usize,
    /// Name of the state the worker was executing.
    pub state: String,
    /// Zero-based iteration the worker was on.
    pub iteration: u64,
    /// The raw error.
    pub error: FixtureError,
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "worker {} failed in state `{}` on iteration {}: {}",
            self.worker_id, self.state, self.iteration, self.error
        )
    }
}
