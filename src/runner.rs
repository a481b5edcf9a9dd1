//! Lifecycle coordination: setup, worker threads, join barrier, teardown.
//!
//! A run moves through `Unstarted -> SettingUp -> Running -> TearingDown`
//! and terminates in `Done` or `Aborted`. Two guarantees hold regardless
//! of failures:
//!
//! - `setup` completes before any worker starts, and a setup failure
//!   aborts the run with no workers spawned;
//! - every worker is joined before `teardown` runs, and `teardown` runs
//!   even when the running phase ended in error. A fatal error in one
//!   worker never cancels its peers, so no worker is left holding
//!   fixture-side resources when cleanup starts.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use hdrhistogram::Histogram;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, FixtureError, WorkerFailure};
use crate::fixture::{ClusterFixture, WorkerHandle};
use crate::options::RunOptions;
use crate::transition::TransitionTable;
use crate::worker::{run_worker, WorkerContext, WorkerOutcome};
use crate::workload::Workload;

/// Phase of a run's lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// No run has started.
    Unstarted,
    /// The setup hook is executing, single-threaded.
    SettingUp,
    /// Worker threads are executing their state loops.
    Running,
    /// The teardown hook is executing after the join barrier.
    TearingDown,
    /// Terminal: the run completed without a fatal condition.
    Done,
    /// Terminal: setup, a worker, or teardown reported a fatal condition.
    Aborted,
}

/// Drives workloads against a fixture.
pub struct Runner<F: ClusterFixture> {
    fixture: Arc<F>,
    options: RunOptions,
}

impl<F: ClusterFixture> Runner<F> {
    /// Creates a runner with default options.
    #[must_use]
    pub fn new(fixture: Arc<F>) -> Self {
        Self {
            fixture,
            options: RunOptions::default(),
        }
    }

    /// Replaces the runner's options.
    #[must_use]
    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs one workload to completion and reports the result.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the definition is structurally
    /// invalid; in that case nothing executed.
    pub fn run<D>(&self, workload: &Workload<F, D>) -> Result<RunReport, ConfigError>
    where
        D: Clone + Send + 'static,
    {
        workload.validate()?;

        let seed = self.options.seed;
        let collection = self
            .options
            .collection
            .clone()
            .unwrap_or_else(|| format!("{}_coll", workload.name));
        let started = Instant::now();

        info!(
            workload = %workload.name,
            seed,
            threads = workload.thread_count,
            iterations = workload.iterations,
            collection = %collection,
            "starting workload run"
        );

        // SettingUp: exactly once, single-threaded, before any worker.
        debug!(workload = %workload.name, "phase: setting up");
        if let Some(hook) = &workload.setup {
            if let Err(error) = hook(self.fixture.as_ref(), &collection) {
                warn!(error = %error, "setup failed, no workers spawned");
                return Ok(RunReport {
                    workload: workload.name.clone(),
                    seed,
                    phase: RunPhase::Aborted,
                    passed: false,
                    setup_error: Some(error),
                    teardown_error: None,
                    failures: Vec::new(),
                    stats: RunStats::empty(workload.thread_count, started),
                    traces: Vec::new(),
                });
            }
        }

        // Running: spawn every worker, then hold the join barrier.
        debug!(workload = %workload.name, "phase: running");
        let ctx = Arc::new(WorkerContext {
            states: workload.states.clone(),
            table: TransitionTable::new(&workload.transitions),
            collection: collection.clone(),
            tolerated: workload.tolerated_errors.clone(),
            iterations: workload.iterations,
            start_state: workload.start_state.clone(),
            record_trace: self.options.record_trace,
        });

        let mut handles = Vec::with_capacity(workload.thread_count);
        let mut failures = Vec::new();

        for id in 0..workload.thread_count {
            let ctx = Arc::clone(&ctx);
            let handle = WorkerHandle::new(Arc::clone(&self.fixture), workload.pass_connection_cache);
            let data = workload.data.clone();
            let spawned = thread::Builder::new()
                .name(format!("stampede-worker-{id}"))
                .spawn(move || run_worker(id, &ctx, handle, data, seed));
            match spawned {
                Ok(join_handle) => handles.push((id, join_handle)),
                Err(error) => {
                    warn!(worker = id, error = %error, "failed to spawn worker thread");
                    failures.push(WorkerFailure {
                        worker_id: id,
                        state: workload.start_state.clone(),
                        iteration: 0,
                        error: FixtureError::new("ThreadSpawn", error.to_string()),
                    });
                }
            }
        }

        let mut outcomes: Vec<Option<WorkerOutcome>> = Vec::with_capacity(handles.len());
        for (id, join_handle) in handles {
            match join_handle.join() {
                Ok(outcome) => outcomes.push(Some(outcome)),
                Err(payload) => {
                    // A panic in a state function surfaces here.
                    let message = panic_message(payload.as_ref());
                    warn!(worker = id, message = %message, "worker panicked");
                    failures.push(WorkerFailure {
                        worker_id: id,
                        state: String::new(),
                        iteration: 0,
                        error: FixtureError::new("WorkerPanic", message),
                    });
                    outcomes.push(None);
                }
            }
        }

        // TearingDown: always runs after the join barrier.
        debug!(workload = %workload.name, "phase: tearing down");
        let teardown_error = workload
            .teardown
            .as_ref()
            .and_then(|hook| hook(self.fixture.as_ref(), &collection).err());
        if let Some(error) = &teardown_error {
            warn!(error = %error, "teardown failed");
        }

        // Aggregate.
        let mut merged = Histogram::<u64>::new(3).expect("histogram creation");
        let mut iterations_total = 0;
        let mut tolerated_errors = 0;
        let mut traces = Vec::new();
        for outcome in outcomes.into_iter().flatten() {
            iterations_total += outcome.iterations_completed;
            tolerated_errors += outcome.tolerated_errors;
            let _ = merged.add(&outcome.latencies);
            if self.options.record_trace {
                traces.push(outcome.trace);
            }
            if let Some(failure) = outcome.failure {
                failures.push(failure);
            }
        }
        failures.sort_by_key(|f| f.worker_id);
        let mut stats = RunStats::from_histogram(workload.thread_count, &merged, started);
        stats.iterations_total = iterations_total;
        stats.tolerated_errors = tolerated_errors;

        let passed = failures.is_empty() && teardown_error.is_none();
        let phase = if passed { RunPhase::Done } else { RunPhase::Aborted };
        info!(
            workload = %workload.name,
            seed,
            passed,
            iterations = stats.iterations_total,
            failures = failures.len(),
            "workload run finished"
        );

        Ok(RunReport {
            workload: workload.name.clone(),
            seed,
            phase,
            passed,
            setup_error: None,
            teardown_error,
            failures,
            stats,
            traces,
        })
    }

    /// Runs a list of workloads serially, validating all of them before
    /// any execution starts.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found during upfront validation.
    pub fn run_all<D>(&self, workloads: &[Workload<F, D>]) -> Result<Vec<RunReport>, ConfigError>
    where
        D: Clone + Send + 'static,
    {
        for workload in workloads {
            workload.validate()?;
        }
        workloads.iter().map(|w| self.run(w)).collect()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Aggregated statistics for one run.
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Number of worker threads the workload declared.
    pub threads: usize,
    /// Sum of completed iterations across workers.
    pub iterations_total: u64,
    /// Errors swallowed as expected concurrency errors.
    pub tolerated_errors: u64,
    /// Wall-clock duration of the whole run in milliseconds.
    pub duration_ms: u64,
    /// State-execution latency p50 in milliseconds.
    pub state_latency_p50: f64,
    /// State-execution latency p95 in milliseconds.
    pub state_latency_p95: f64,
    /// State-execution latency p99 in milliseconds.
    pub state_latency_p99: f64,
    /// State-execution latency max in milliseconds.
    pub state_latency_max: f64,
}

impl RunStats {
    fn empty(threads: usize, started: Instant) -> Self {
        Self::from_histogram(
            threads,
            &Histogram::new(3).expect("histogram creation"),
            started,
        )
    }

    #[allow(clippy::cast_possible_truncation)] // millis fit u64 for any test run
    #[allow(clippy::cast_precision_loss)]
    fn from_histogram(threads: usize, latencies: &Histogram<u64>, started: Instant) -> Self {
        Self {
            threads,
            iterations_total: 0,
            tolerated_errors: 0,
            duration_ms: started.elapsed().as_millis() as u64,
            state_latency_p50: latencies.value_at_percentile(50.0) as f64 / 1000.0,
            state_latency_p95: latencies.value_at_percentile(95.0) as f64 / 1000.0,
            state_latency_p99: latencies.value_at_percentile(99.0) as f64 / 1000.0,
            state_latency_max: latencies.max() as f64 / 1000.0,
        }
    }
}

/// The result of one workload run.
#[derive(Debug)]
pub struct RunReport {
    /// Name of the workload that ran.
    pub workload: String,
    /// Seed the run used; reusing it reproduces every worker's
    /// transition choices.
    pub seed: u64,
    /// Terminal phase, [`RunPhase::Done`] or [`RunPhase::Aborted`].
    pub phase: RunPhase,
    /// Overall pass/fail.
    pub passed: bool,
    /// Error raised by the setup hook, if any. When set, no workers ran.
    pub setup_error: Option<FixtureError>,
    /// Error raised by the teardown hook, if any.
    pub teardown_error: Option<FixtureError>,
    /// Every fatal worker failure, ordered by worker id.
    pub failures: Vec<WorkerFailure>,
    /// Aggregated statistics.
    pub stats: RunStats,
    /// Per-worker visited-state traces in worker-id order; a worker that
    /// panicked contributes none. Empty unless
    /// [`RunOptions::record_trace`] was set.
    pub traces: Vec<Vec<String>>,
}

impl RunReport {
    /// Prints a human-readable summary.
    pub fn print_summary(&self) {
        println!("=== Workload `{}` ===", self.workload);
        println!(
            "Result: {} (seed {})",
            if self.passed { "PASS" } else { "FAIL" },
            self.seed
        );
        println!(
            "Iterations: {} across {} workers, {} tolerated errors",
            self.stats.iterations_total, self.stats.threads, self.stats.tolerated_errors
        );
        println!(
            "State latency: p50={:.2}ms p95={:.2}ms p99={:.2}ms max={:.2}ms",
            self.stats.state_latency_p50,
            self.stats.state_latency_p95,
            self.stats.state_latency_p99,
            self.stats.state_latency_max
        );
        println!("Duration: {}ms", self.stats.duration_ms);
        if let Some(error) = &self.setup_error {
            println!("Setup error: {error}");
        }
        if let Some(error) = &self.teardown_error {
            println!("Teardown error: {error}");
        }
        for failure in &self.failures {
            println!("  - {failure}");
        }
    }
}
