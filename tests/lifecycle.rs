//! Lifecycle ordering tests: setup before workers, teardown after the
//! join barrier, worker isolation, connection cache plumbing.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use stampede::{ClusterFixture, FixtureError, RunOptions, RunPhase, Runner, WorkerHandle, Workload};

/// Fixture that records lifecycle events and counts connections.
#[derive(Debug, Default)]
struct EventFixture {
    events: Mutex<Vec<String>>,
    connects: AtomicUsize,
    global_counter: AtomicU64,
    tripped: AtomicBool,
}

impl EventFixture {
    fn log(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ClusterFixture for EventFixture {
    type Conn = String;

    fn connect(&self) -> Result<String, FixtureError> {
        self.connect_to("node0")
    }

    fn data_nodes(&self) -> Vec<String> {
        vec!["node0".to_string(), "node1".to_string()]
    }

    fn config_nodes(&self) -> Vec<String> {
        Vec::new()
    }

    fn connect_to(&self, node: &str) -> Result<String, FixtureError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(node.to_string())
    }
}

fn runner(fixture: &Arc<EventFixture>) -> Runner<EventFixture> {
    Runner::new(Arc::clone(fixture)).options(RunOptions::default().with_seed(1))
}

/// Setup completes before the first state invocation; teardown's event is
/// last, after every worker finished.
#[test]
fn setup_runs_before_states_and_teardown_after() {
    let fixture = Arc::new(EventFixture::default());

    let workload = Workload::builder("ordered", ())
        .threads(4)
        .iterations(25)
        .start_state("work")
        .state("work", |handle: &mut WorkerHandle<EventFixture>, _, _| {
            handle.fixture().log("state");
            Ok(())
        })
        .transition("work", &[("work", 1.0)])
        .setup(|fixture, coll| {
            fixture.log("setup");
            assert_eq!(coll, "ordered_coll");
            Ok(())
        })
        .teardown(|fixture, _| {
            fixture.log("teardown");
            Ok(())
        })
        .build()
        .unwrap();

    let report = runner(&fixture).run(&workload).unwrap();
    assert!(report.passed);

    let events = fixture.events();
    assert_eq!(events.len(), 102);
    assert_eq!(events.first().map(String::as_str), Some("setup"));
    assert_eq!(events.last().map(String::as_str), Some("teardown"));
    assert!(events[1..101].iter().all(|e| e == "state"));
}

/// Teardown still runs when a worker dies on its first iteration of many.
#[test]
fn teardown_runs_despite_early_worker_failure() {
    let fixture = Arc::new(EventFixture::default());

    let workload = Workload::builder("early_death", ())
        .threads(4)
        .iterations(100)
        .start_state("work")
        .state("work", |handle: &mut WorkerHandle<EventFixture>, _, _| {
            // Exactly one worker trips this, on its first iteration.
            if !handle.fixture().tripped.swap(true, Ordering::SeqCst) {
                return Err(FixtureError::new("InternalFault", "injected"));
            }
            Ok(())
        })
        .transition("work", &[("work", 1.0)])
        .teardown(|fixture, _| {
            fixture.log("teardown");
            Ok(())
        })
        .build()
        .unwrap();

    let report = runner(&fixture).run(&workload).unwrap();

    assert!(!report.passed);
    assert_eq!(report.phase, RunPhase::Aborted);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error.code, "InternalFault");
    // The three surviving workers ran all 100 iterations before teardown.
    assert_eq!(report.stats.iterations_total, 300);
    assert_eq!(fixture.events().last().map(String::as_str), Some("teardown"));
}

/// A setup failure aborts the run with no workers spawned.
#[test]
fn setup_failure_spawns_no_workers() {
    let fixture = Arc::new(EventFixture::default());

    let workload = Workload::builder("bad_setup", ())
        .threads(8)
        .iterations(50)
        .start_state("work")
        .state("work", |handle: &mut WorkerHandle<EventFixture>, _, _| {
            handle.fixture().log("state");
            Ok(())
        })
        .transition("work", &[("work", 1.0)])
        .setup(|_, _| Err(FixtureError::new("NamespaceExists", "collection already there")))
        .teardown(|fixture, _| {
            fixture.log("teardown");
            Ok(())
        })
        .build()
        .unwrap();

    let report = runner(&fixture).run(&workload).unwrap();

    assert!(!report.passed);
    assert_eq!(report.phase, RunPhase::Aborted);
    assert_eq!(report.setup_error.as_ref().map(|e| e.code.as_str()), Some("NamespaceExists"));
    assert_eq!(report.stats.iterations_total, 0);
    assert!(fixture.events().is_empty());
}

/// A teardown failure marks the run failed even when everything else
/// passed.
#[test]
fn teardown_failure_fails_the_run() {
    let fixture = Arc::new(EventFixture::default());

    let workload = Workload::builder("bad_teardown", ())
        .threads(2)
        .iterations(5)
        .start_state("work")
        .state("work", |_, _, _| Ok(()))
        .transition("work", &[("work", 1.0)])
        .teardown(|_, _| Err(FixtureError::new("LockTimeout", "could not drop collection")))
        .build()
        .unwrap();

    let report = runner(&fixture).run(&workload).unwrap();

    assert!(!report.passed);
    assert_eq!(report.phase, RunPhase::Aborted);
    assert_eq!(report.teardown_error.as_ref().map(|e| e.code.as_str()), Some("LockTimeout"));
    // Workers themselves all completed.
    assert!(report.failures.is_empty());
    assert_eq!(report.stats.iterations_total, 10);
}

/// Each worker mutates its own clone of the data template; the clones
/// never interfere.
#[test]
fn worker_local_data_is_isolated() {
    let fixture = Arc::new(EventFixture::default());
    let iterations = 50u64;

    let workload = Workload::builder("isolated", 0u64)
        .threads(4)
        .iterations(iterations)
        .start_state("count")
        .state("count", move |handle: &mut WorkerHandle<EventFixture>, _, local: &mut u64| {
            *local += 1;
            handle.fixture().global_counter.fetch_add(1, Ordering::SeqCst);
            if *local == iterations {
                handle.fixture().log(format!("final:{local}"));
            }
            Ok(())
        })
        .transition("count", &[("count", 1.0)])
        .build()
        .unwrap();

    let report = runner(&fixture).run(&workload).unwrap();
    assert!(report.passed);

    // The shared counter saw every invocation, but each worker's local
    // count reached exactly `iterations`.
    assert_eq!(fixture.global_counter.load(Ordering::SeqCst), 200);
    let finals: Vec<String> = fixture
        .events()
        .into_iter()
        .filter(|e| e.starts_with("final:"))
        .collect();
    assert_eq!(finals.len(), 4);
    assert!(finals.iter().all(|e| e == "final:50"));
}

/// Workers get a connection cache only when the workload asks for one,
/// and the cache holds one connection per node per worker.
#[test]
fn connection_cache_is_per_worker_and_lazy() {
    let fixture = Arc::new(EventFixture::default());

    let workload = Workload::builder("cached", ())
        .threads(3)
        .iterations(10)
        .start_state("poke")
        .state("poke", |handle: &mut WorkerHandle<EventFixture>, _, _| {
            let cache = handle
                .cache()
                .ok_or_else(|| FixtureError::new("NoCache", "cache missing"))?;
            let conn = cache.get("node0")?;
            assert_eq!(conn.as_str(), "node0");
            Ok(())
        })
        .transition("poke", &[("poke", 1.0)])
        .pass_connection_cache(true)
        .build()
        .unwrap();

    let report = runner(&fixture).run(&workload).unwrap();
    assert!(report.passed);
    // One connection per worker, reused across its 10 iterations.
    assert_eq!(fixture.connects.load(Ordering::SeqCst), 3);
}
