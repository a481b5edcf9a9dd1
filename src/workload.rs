//! Workload definitions: the declarative shape of a test scenario.
//!
//! A [`Workload`] is an immutable template: named states, weighted
//! transitions between them, a per-worker data template, and lifecycle
//! hooks. The runner never mutates a definition; each worker operates on
//! its own clone of the data template.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{ConfigError, ConfigViolation, FixtureError};
use crate::fixture::{ClusterFixture, WorkerHandle};

/// A state function: one named unit of behavior a worker executes against
/// the fixture.
///
/// Side effects go through the handle or the worker's local data only;
/// state functions take their inputs explicitly rather than closing over
/// shared mutable variables, which is what keeps workers isolated.
pub type StateFn<F, D> =
    Arc<dyn Fn(&mut WorkerHandle<F>, &str, &mut D) -> Result<(), FixtureError> + Send + Sync>;

/// A lifecycle hook, invoked exactly once per run regardless of thread
/// count. Receives the fixture and the collection name.
pub type HookFn<F> = Arc<dyn Fn(&F, &str) -> Result<(), FixtureError> + Send + Sync>;

/// An immutable template for a concurrent test scenario.
///
/// Fields are public so a composition override can reassign any of them
/// directly; see [`extend`](crate::extend). A definition handed to the
/// runner is never mutated.
pub struct Workload<F: ClusterFixture, D> {
    /// Name used for logging and default collection naming.
    pub name: String,
    /// Number of independent worker threads, at least 1.
    pub thread_count: usize,
    /// Number of state transitions each worker performs.
    pub iterations: u64,
    /// Name of the initial state; must be a key of `states`.
    pub start_state: String,
    /// State name to state function.
    pub states: BTreeMap<String, StateFn<F, D>>,
    /// State name to its weighted transition row, entries in declaration
    /// order. Every state reachable from `start_state` needs a row with at
    /// least one positive-weight entry; terminal states are self-loops.
    pub transitions: BTreeMap<String, Vec<(String, f64)>>,
    /// Template for each worker's private mutable state. Never shared by
    /// reference across workers; each worker gets its own clone.
    pub data: D,
    /// Invoked once before any worker starts.
    pub setup: Option<HookFn<F>>,
    /// Invoked once after all workers finished, even on failure.
    pub teardown: Option<HookFn<F>>,
    /// When set, workers receive a per-worker connection cache inside
    /// their handle.
    pub pass_connection_cache: bool,
    /// Error codes tolerated as expected concurrency errors: a state
    /// function failing with one of these codes does not abort the worker.
    pub tolerated_errors: BTreeSet<String>,
}

impl<F: ClusterFixture, D> std::fmt::Debug for Workload<F, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workload")
            .field("name", &self.name)
            .field("thread_count", &self.thread_count)
            .field("iterations", &self.iterations)
            .field("start_state", &self.start_state)
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .field("transitions", &self.transitions)
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .field("pass_connection_cache", &self.pass_connection_cache)
            .field("tolerated_errors", &self.tolerated_errors)
            .finish_non_exhaustive()
    }
}

impl<F: ClusterFixture, D: Clone> Clone for Workload<F, D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            thread_count: self.thread_count,
            iterations: self.iterations,
            start_state: self.start_state.clone(),
            states: self.states.clone(),
            transitions: self.transitions.clone(),
            data: self.data.clone(),
            setup: self.setup.clone(),
            teardown: self.teardown.clone(),
            pass_connection_cache: self.pass_connection_cache,
            tolerated_errors: self.tolerated_errors.clone(),
        }
    }
}

impl<F: ClusterFixture, D> Workload<F, D> {
    /// Creates a builder for a named workload with the given data template.
    #[must_use]
    pub fn builder(name: impl Into<String>, data: D) -> WorkloadBuilder<F, D> {
        WorkloadBuilder::new(name, data)
    }

    /// Validates the definition's structural invariants.
    ///
    /// Collects every violation it can find: unknown start state, rows or
    /// targets naming undeclared states, negative weights, reachable
    /// states with no row or no positive-weight successor, zero threads.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] carrying all violations found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut violations = Vec::new();

        if self.thread_count == 0 {
            violations.push(ConfigViolation::ZeroThreads);
        }

        if !self.states.contains_key(&self.start_state) {
            violations.push(ConfigViolation::UnknownStartState(self.start_state.clone()));
        }

        for (from, row) in &self.transitions {
            if !self.states.contains_key(from) {
                violations.push(ConfigViolation::UnknownTransitionSource(from.clone()));
            }
            for (to, weight) in row {
                if !self.states.contains_key(to) {
                    violations.push(ConfigViolation::UnknownTransitionTarget {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
                if *weight < 0.0 {
                    violations.push(ConfigViolation::NegativeWeight {
                        from: from.clone(),
                        to: to.clone(),
                        weight: *weight,
                    });
                }
            }
        }

        // Reachability: every state a worker can actually arrive in must
        // have a row it can leave through.
        if self.states.contains_key(&self.start_state) {
            for state in self.reachable_states() {
                match self.transitions.get(&state) {
                    None => violations.push(ConfigViolation::MissingTransitionRow(state)),
                    Some(row) => {
                        if !row.iter().any(|(_, w)| *w > 0.0) {
                            violations.push(ConfigViolation::NoReachableSuccessor(state));
                        }
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(violations))
        }
    }

    /// States reachable from the start state through positive-weight
    /// edges, in breadth-first order.
    fn reachable_states(&self) -> Vec<String> {
        let mut visited = BTreeSet::new();
        let mut order = Vec::new();
        let mut frontier = vec![self.start_state.clone()];
        visited.insert(self.start_state.clone());

        while let Some(state) = frontier.pop() {
            order.push(state.clone());
            let Some(row) = self.transitions.get(&state) else {
                continue;
            };
            for (to, weight) in row {
                if *weight > 0.0
                    && self.states.contains_key(to)
                    && visited.insert(to.clone())
                {
                    frontier.push(to.clone());
                }
            }
        }
        order
    }
}

/// Builder for [`Workload`] definitions.
///
/// `build` validates the result, so an invalid definition never reaches
/// the runner.
pub struct WorkloadBuilder<F: ClusterFixture, D> {
    workload: Workload<F, D>,
}

impl<F: ClusterFixture, D> WorkloadBuilder<F, D> {
    /// Creates a builder with the given name and data template.
    #[must_use]
    pub fn new(name: impl Into<String>, data: D) -> Self {
        Self {
            workload: Workload {
                name: name.into(),
                thread_count: 1,
                iterations: 0,
                start_state: String::new(),
                states: BTreeMap::new(),
                transitions: BTreeMap::new(),
                data,
                setup: None,
                teardown: None,
                pass_connection_cache: false,
                tolerated_errors: BTreeSet::new(),
            },
        }
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn threads(mut self, count: usize) -> Self {
        self.workload.thread_count = count;
        self
    }

    /// Sets the number of state transitions each worker performs.
    #[must_use]
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.workload.iterations = iterations;
        self
    }

    /// Sets the initial state.
    #[must_use]
    pub fn start_state(mut self, name: impl Into<String>) -> Self {
        self.workload.start_state = name.into();
        self
    }

    /// Declares a state and its function.
    #[must_use]
    pub fn state<S>(mut self, name: impl Into<String>, func: S) -> Self
    where
        S: Fn(&mut WorkerHandle<F>, &str, &mut D) -> Result<(), FixtureError>
            + Send
            + Sync
            + 'static,
    {
        self.workload.states.insert(name.into(), Arc::new(func));
        self
    }

    /// Declares the weighted transition row for a state. Entries keep
    /// their declaration order.
    #[must_use]
    pub fn transition(mut self, from: impl Into<String>, row: &[(&str, f64)]) -> Self {
        let row = row
            .iter()
            .map(|(to, weight)| ((*to).to_string(), *weight))
            .collect();
        self.workload.transitions.insert(from.into(), row);
        self
    }

    /// Sets the setup hook.
    #[must_use]
    pub fn setup<H>(mut self, hook: H) -> Self
    where
        H: Fn(&F, &str) -> Result<(), FixtureError> + Send + Sync + 'static,
    {
        self.workload.setup = Some(Arc::new(hook));
        self
    }

    /// Sets the teardown hook.
    #[must_use]
    pub fn teardown<H>(mut self, hook: H) -> Self
    where
        H: Fn(&F, &str) -> Result<(), FixtureError> + Send + Sync + 'static,
    {
        self.workload.teardown = Some(Arc::new(hook));
        self
    }

    /// Requests a per-worker connection cache.
    #[must_use]
    pub fn pass_connection_cache(mut self, pass: bool) -> Self {
        self.workload.pass_connection_cache = pass;
        self
    }

    /// Adds an error code to the expected-concurrency-error allow-list.
    #[must_use]
    pub fn tolerate(mut self, code: impl Into<String>) -> Self {
        self.workload.tolerated_errors.insert(code.into());
        self
    }

    /// Validates and returns the definition.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] listing every structural violation.
    pub fn build(self) -> Result<Workload<F, D>, ConfigError> {
        self.workload.validate()?;
        Ok(self.workload)
    }
}
