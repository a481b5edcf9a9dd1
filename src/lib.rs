//! Stampede: a concurrent FSM workload framework.
//!
//! Runs many independent worker threads, each executing a probabilistic
//! state machine against a shared cluster fixture, to surface concurrency
//! bugs (races, deadlocks, inconsistent reads) in the system under test.
//! The framework is a generator of concurrent pressure, not an arbiter of
//! it: workers never synchronize with each other, only with the
//! setup/teardown lifecycle barriers.
//!
//! # Architecture
//!
//! - A [`Workload`] declares named states, weighted transitions, a
//!   per-worker data template, and lifecycle hooks. [`extend`] derives a
//!   new definition from a base plus overrides.
//! - The [`Runner`] validates the definition, runs `setup` once, spawns
//!   the workers, joins all of them, then runs `teardown` once — even
//!   when the run failed.
//! - Each worker owns a ChaCha8 RNG seeded from the run seed and its id,
//!   so a logged seed reproduces the exact sequence of transition
//!   choices.
//! - The [`ClusterFixture`] trait is the only seam to the system under
//!   test; the same workload runs against any topology.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stampede::{Runner, RunOptions, Workload};
//!
//! let workload = Workload::builder("counter_churn", MyData::default())
//!     .threads(8)
//!     .iterations(200)
//!     .start_state("insert")
//!     .state("insert", |handle, coll, data| { /* ... */ Ok(()) })
//!     .state("drop", |handle, coll, data| { /* ... */ Ok(()) })
//!     .transition("insert", &[("insert", 3.0), ("drop", 1.0)])
//!     .transition("drop", &[("insert", 1.0)])
//!     .tolerate("Interrupted")
//!     .build()?;
//!
//! let runner = Runner::new(Arc::new(fixture)).options(RunOptions::default().with_seed(42));
//! let report = runner.run(&workload)?;
//! assert!(report.passed, "seed {} reproduces this failure", report.seed);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod compose;
mod error;
mod fixture;
mod options;
mod runner;
mod transition;
mod worker;
mod workload;

#[cfg(test)]
mod test_support;

pub use compose::extend;
pub use error::{ConfigError, ConfigViolation, FixtureError, WorkerFailure};
pub use fixture::{ClusterFixture, ConnectionCache, WorkerHandle};
pub use options::{OptionsError, RunOptions};
pub use runner::{RunPhase, RunReport, RunStats, Runner};
pub use transition::{TransitionRow, TransitionTable};
pub use workload::{HookFn, StateFn, Workload, WorkloadBuilder};
