//! Runner configuration, loadable from TOML.
//!
//! Every field has a default so a partial file (or none at all) works:
//!
//! ```toml
//! seed = 8675309
//! collection = "fsm_stress"
//! record_trace = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Options controlling how the runner executes a workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Global seed; combined with each worker's id to seed its RNG.
    /// Reported back in the run result so a failing run can be
    /// reproduced.
    pub seed: u64,
    /// Collection name handed to state functions and hooks. Defaults to
    /// `<workload-name>_coll` when unset.
    pub collection: Option<String>,
    /// Record each worker's visited-state sequence in the report.
    /// Costs memory proportional to `threads * iterations`.
    pub record_trace: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            collection: None,
            record_trace: false,
        }
    }
}

impl RunOptions {
    /// Loads options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, OptionsError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| OptionsError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parses options from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML cannot be parsed.
    pub fn from_toml(toml: &str) -> Result<Self, OptionsError> {
        toml::from_str(toml).map_err(|e| OptionsError::Parse {
            message: e.to_string(),
        })
    }

    /// Serializes the options to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Returns a copy with the given seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Error type for options loading.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    /// I/O error reading the options file.
    #[error("failed to read options from {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// TOML parse error.
    #[error("failed to parse options: {message}")]
    Parse {
        /// Error message.
        message: String,
    },
}
