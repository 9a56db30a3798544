//! Engine configuration
//!
//! Loaded from a JSON file; every field except `log_path` has a default.
//!
//! ```json
//! {
//!   "log_path": "./data/groupwal.log",
//!   "queue_capacity": 4096,
//!   "collect_interval_micros": 1000,
//!   "fault_after_io_failures": 3
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{EngineError, EngineResult};
use super::intake::DEFAULT_QUEUE_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Append-only log file
    pub log_path: PathBuf,

    /// Bounded intake queue size (default 4096)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Time between collection cycles (default 1 ms).
    /// Longer intervals put more requests behind each fsync at the cost of
    /// per-request latency.
    #[serde(default = "default_collect_interval_micros")]
    pub collect_interval_micros: u64,

    /// Consecutive failed batches after which the engine faults (default 3).
    /// 0 keeps the engine running through any number of failures.
    #[serde(default = "default_fault_after_io_failures")]
    pub fault_after_io_failures: u32,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_collect_interval_micros() -> u64 {
    1_000
}
fn default_fault_after_io_failures() -> u32 {
    3
}

impl EngineConfig {
    /// Defaults for everything but the log path.
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            queue_capacity: default_queue_capacity(),
            collect_interval_micros: default_collect_interval_micros(),
            fault_after_io_failures: default_fault_after_io_failures(),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_collect_interval(mut self, interval: Duration) -> Self {
        self.collect_interval_micros = interval.as_micros() as u64;
        self
    }

    pub fn with_fault_after_io_failures(mut self, failures: u32) -> Self {
        self.fault_after_io_failures = failures;
        self
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_micros(self.collect_interval_micros)
    }

    /// Load and validate configuration from a JSON file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| EngineError::Config(format!("invalid config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.log_path.as_os_str().is_empty() {
            return Err(EngineError::Config("log_path must not be empty".into()));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::Config("queue_capacity must be > 0".into()));
        }
        if self.collect_interval_micros == 0 {
            return Err(EngineError::Config(
                "collect_interval_micros must be > 0".into(),
            ));
        }
        Ok(())
    }
}
