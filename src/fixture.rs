//! The narrow surface through which workloads reach the system under test.
//!
//! The framework never assumes a specific topology (single node, replica
//! set, sharded cluster); it only requires that a fixture's operations are
//! safe to call concurrently from multiple workers. Everything else — what
//! a connection actually is, how nodes are addressed — belongs to the
//! fixture implementation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::FixtureError;

/// A handle to the cluster under test.
///
/// This is the seam between the execution engine and fixture-provisioning
/// code: the same workload runs unchanged against a standalone node, a
/// replica set, or a sharded cluster, as long as the fixture implements
/// this trait.
pub trait ClusterFixture: Send + Sync + 'static {
    /// Connection type handed to workloads.
    type Conn: Send;

    /// Opens a connection to the cluster's default entry point.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn connect(&self) -> Result<Self::Conn, FixtureError>;

    /// Identities of every data-bearing node.
    fn data_nodes(&self) -> Vec<String>;

    /// Identities of every config node. Empty for unsharded topologies.
    fn config_nodes(&self) -> Vec<String>;

    /// Opens a connection to one specific node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown or unreachable.
    fn connect_to(&self, node: &str) -> Result<Self::Conn, FixtureError>;

    /// Runs `op` against every data-bearing node in turn.
    ///
    /// Used by lifecycle hooks that need to apply a privileged command
    /// cluster-wide (toggling a failpoint on every shard, for example).
    ///
    /// # Errors
    ///
    /// Stops at and returns the first connection or operation error.
    fn on_data_nodes(
        &self,
        op: &mut dyn FnMut(&mut Self::Conn) -> Result<(), FixtureError>,
    ) -> Result<(), FixtureError> {
        for node in self.data_nodes() {
            let mut conn = self.connect_to(&node)?;
            op(&mut conn)?;
        }
        Ok(())
    }

    /// Runs `op` against every config node in turn.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first connection or operation error.
    fn on_config_nodes(
        &self,
        op: &mut dyn FnMut(&mut Self::Conn) -> Result<(), FixtureError>,
    ) -> Result<(), FixtureError> {
        for node in self.config_nodes() {
            let mut conn = self.connect_to(&node)?;
            op(&mut conn)?;
        }
        Ok(())
    }
}

/// Lazily-populated per-worker cache of connections keyed by node identity.
///
/// Owned by exactly one worker, so no locking is needed. Workloads opt in
/// via [`Workload::pass_connection_cache`](crate::Workload::pass_connection_cache).
pub struct ConnectionCache<F: ClusterFixture> {
    fixture: Arc<F>,
    conns: HashMap<String, F::Conn>,
}

impl<F: ClusterFixture> ConnectionCache<F> {
    pub(crate) fn new(fixture: Arc<F>) -> Self {
        Self {
            fixture,
            conns: HashMap::new(),
        }
    }

    /// Returns the cached connection for `node`, connecting on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if a fresh connection to `node` cannot be opened.
    pub fn get(&mut self, node: &str) -> Result<&mut F::Conn, FixtureError> {
        if !self.conns.contains_key(node) {
            let conn = self.fixture.connect_to(node)?;
            self.conns.insert(node.to_string(), conn);
        }
        Ok(self.conns.get_mut(node).expect("connection just inserted"))
    }

    /// Number of cached connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conns.len()
    }

    /// Returns true if no connection has been opened yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }
}

/// What a state function receives as its first argument.
///
/// Always exposes the fixture itself; additionally carries a
/// [`ConnectionCache`] when the workload requested one.
pub struct WorkerHandle<F: ClusterFixture> {
    fixture: Arc<F>,
    cache: Option<ConnectionCache<F>>,
}

impl<F: ClusterFixture> WorkerHandle<F> {
    pub(crate) fn new(fixture: Arc<F>, with_cache: bool) -> Self {
        let cache = with_cache.then(|| ConnectionCache::new(Arc::clone(&fixture)));
        Self { fixture, cache }
    }

    /// The cluster fixture.
    #[must_use]
    pub fn fixture(&self) -> &F {
        &self.fixture
    }

    /// The per-worker connection cache, if the workload requested one.
    pub fn cache(&mut self) -> Option<&mut ConnectionCache<F>> {
        self.cache.as_mut()
    }
}
