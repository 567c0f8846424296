//! Runtime configuration.
//!
//! Read from a JSON file; every field is optional and falls back to its
//! default.
//!
//! ```json
//! {
//!     "tracking": { "proof_attempts": 3, "parallel_proofs": true },
//!     "polling": { "max_attempts": 10, "initial_backoff_ms": 10, "growth_factor": 2 },
//!     "storage": { "root": "/home/me/.keytrack" }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustError};
use crate::team::PollSchedule;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracking: TrackingConfig,
    pub polling: PollingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Total tries per proof when the verifier reports a transient error.
    pub proof_attempts: u32,
    /// Check a target's proofs concurrently.
    pub parallel_proofs: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            proof_attempts: 3,
            parallel_proofs: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub growth_factor: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 10,
            growth_factor: 2,
        }
    }
}

impl PollingConfig {
    pub fn schedule(&self) -> PollSchedule {
        PollSchedule {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            growth_factor: self.growth_factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            root: home.join(".keytrack"),
        }
    }
}

impl StorageConfig {
    pub fn statements_dir(&self) -> PathBuf {
        self.root.join("statements")
    }
}

impl Config {
    /// Load from a JSON file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `InvalidFileFormat` if it is not a
    /// valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            TrustError::InvalidFileFormat(format!("failed to parse config {}: {e}", path.display()))
        })
    }

    /// Load `path` if given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
