//! Shared test fixture for unit tests.

use crate::error::FixtureError;
use crate::fixture::ClusterFixture;

/// A fixture whose connections do nothing, for tests that only exercise
/// the framework's own machinery.
#[derive(Debug, Default)]
pub struct NullFixture;

impl ClusterFixture for NullFixture {
    type Conn = ();

    fn connect(&self) -> Result<(), FixtureError> {
        Ok(())
    }

    fn data_nodes(&self) -> Vec<String> {
        vec!["node0".to_string()]
    }

    fn config_nodes(&self) -> Vec<String> {
        Vec::new()
    }

    fn connect_to(&self, _node: &str) -> Result<(), FixtureError> {
        Ok(())
    }
}
