//! Engine runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Work queue and status reporting.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the bounded work queue.
    #[serde(default = "default_work_queue_capacity")]
    pub work_queue_capacity: usize,
    /// Where to write the JSON status snapshot, if anywhere.
    #[serde(default)]
    pub status_file: Option<PathBuf>,
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

const fn default_work_queue_capacity() -> usize {
    1024
}

const fn default_status_interval_ms() -> u64 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_queue_capacity: default_work_queue_capacity(),
            status_file: None,
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.work_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "work_queue_capacity",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.status_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "status_interval_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
