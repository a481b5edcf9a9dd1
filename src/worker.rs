//! The per-worker state machine loop.
//!
//! Workers run independently: no synchronization between them exists
//! during the loop, only the setup/teardown barriers owned by the runner.
//! Each worker owns its RNG (seeded from the run seed and its id), its
//! clone of the data template, and its latency histogram.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use hdrhistogram::Histogram;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::error::{FixtureError, WorkerFailure};
use crate::fixture::{ClusterFixture, WorkerHandle};
use crate::transition::TransitionTable;
use crate::workload::StateFn;

/// Read-only context shared by all workers of one run.
pub(crate) struct WorkerContext<F: ClusterFixture, D> {
    pub states: BTreeMap<String, StateFn<F, D>>,
    pub table: TransitionTable,
    pub collection: String,
    pub tolerated: BTreeSet<String>,
    pub iterations: u64,
    pub start_state: String,
    pub record_trace: bool,
}

/// What one worker reports back through the join barrier.
pub(crate) struct WorkerOutcome {
    pub id: usize,
    pub iterations_completed: u64,
    pub tolerated_errors: u64,
    pub failure: Option<WorkerFailure>,
    pub latencies: Histogram<u64>,
    /// Visited states, one per iteration; empty unless tracing was
    /// requested.
    pub trace: Vec<String>,
}

/// Derives a worker's RNG seed from the run seed and its id.
///
/// A splitmix64 finalizer keeps adjacent worker ids from producing
/// correlated ChaCha streams while staying a pure function of
/// `(seed, id)`, so a logged run seed reproduces every worker's choices.
pub(crate) fn worker_seed(run_seed: u64, worker_id: usize) -> u64 {
    let mut z = run_seed ^ (worker_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Runs one worker's state loop to completion.
///
/// Completion means `iterations` transitions performed, or the first
/// fatal error, whichever comes first. Errors whose code is on the
/// tolerated list are swallowed and the loop continues.
pub(crate) fn run_worker<F: ClusterFixture, D>(
    id: usize,
    ctx: &Arc<WorkerContext<F, D>>,
    mut handle: WorkerHandle<F>,
    mut local_data: D,
    run_seed: u64,
) -> WorkerOutcome {
    let mut rng = ChaCha8Rng::seed_from_u64(worker_seed(run_seed, id));
    let mut current = ctx.start_state.clone();
    let mut latencies = Histogram::<u64>::new(3).expect("histogram creation");
    let mut trace = Vec::new();
    let mut iterations_completed = 0;
    let mut tolerated_errors = 0;
    let mut failure = None;

    debug!(worker = id, start = %current, "worker started");

    for iteration in 0..ctx.iterations {
        if ctx.record_trace {
            trace.push(current.clone());
        }

        let Some(state_fn) = ctx.states.get(&current) else {
            // Validation makes this unreachable; fail the worker rather
            // than panic if a caller bypassed it.
            failure = Some(WorkerFailure {
                worker_id: id,
                state: current.clone(),
                iteration,
                error: FixtureError::new("InternalError", "state has no function"),
            });
            break;
        };

        let started = Instant::now();
        let result = state_fn(&mut handle, &ctx.collection, &mut local_data);
        #[allow(clippy::cast_possible_truncation)] // micros fit u64 for any test run
        let _ = latencies.record(started.elapsed().as_micros() as u64);

        match result {
            Ok(()) => {}
            Err(error) if ctx.tolerated.contains(&error.code) => {
                tolerated_errors += 1;
                debug!(
                    worker = id,
                    state = %current,
                    code = %error.code,
                    "tolerated expected concurrency error"
                );
            }
            Err(error) => {
                warn!(
                    worker = id,
                    state = %current,
                    iteration,
                    error = %error,
                    "worker hit fatal error"
                );
                failure = Some(WorkerFailure {
                    worker_id: id,
                    state: current.clone(),
                    iteration,
                    error,
                });
                break;
            }
        }

        iterations_completed += 1;

        match ctx.table.select(&current, &mut rng) {
            Some(next) => current = next.to_string(),
            None => {
                failure = Some(WorkerFailure {
                    worker_id: id,
                    state: current.clone(),
                    iteration,
                    error: FixtureError::new("InternalError", "state has no successor"),
                });
                break;
            }
        }
    }

    debug!(
        worker = id,
        iterations = iterations_completed,
        failed = failure.is_some(),
        "worker finished"
    );

    WorkerOutcome {
        id,
        iterations_completed,
        tolerated_errors,
        failure,
        latencies,
        trace,
    }
}
