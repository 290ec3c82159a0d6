//! Status file for external monitoring.
//!
//! Writes a JSON snapshot of the engine that external tools can poll:
//! markets per lifecycle state, provider breaker states and resolution
//! counters.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::application::lifecycle::EngineStatus;
use crate::error::Result;
use crate::infrastructure::config::settings::Config;

/// Current status file format version.
const STATUS_VERSION: &str = "1";

/// Top-level status file structure.
#[derive(Debug, Clone, Serialize)]
pub struct StatusFile {
    /// Schema version for forward compatibility.
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
    /// Static configuration snapshot.
    pub config: StatusConfig,
    /// Latest engine snapshot, absent until the first update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineStatus>,
    pub updated_at: DateTime<Utc>,
}

/// Configuration values worth showing next to the live numbers.
#[derive(Debug, Clone, Serialize)]
pub struct StatusConfig {
    pub absolute_ceiling: f64,
    pub quorum_min: usize,
    pub spread_threshold: f64,
    pub grace_period_ms: u64,
    /// `file` when a verifying key path is configured, `development`
    /// otherwise.
    pub verifying_key: &'static str,
}

impl From<&Config> for StatusConfig {
    fn from(config: &Config) -> Self {
        Self {
            absolute_ceiling: config.leverage.absolute_ceiling,
            quorum_min: config.providers.quorum_min,
            spread_threshold: config.providers.spread_threshold,
            grace_period_ms: config.resolution.grace_period_ms,
            verifying_key: if config.resolution.verifying_key_path.is_some() {
                "file"
            } else {
                "development"
            },
        }
    }
}

/// Writer for the status file.
pub struct StatusWriter {
    path: PathBuf,
    status: Mutex<StatusFile>,
}

impl StatusWriter {
    #[must_use]
    pub fn new(path: PathBuf, config: StatusConfig) -> Self {
        let now = Utc::now();
        Self {
            path,
            status: Mutex::new(StatusFile {
                version: STATUS_VERSION.to_string(),
                started_at: now,
                pid: std::process::id(),
                config,
                engine: None,
                updated_at: now,
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the engine snapshot.
    pub fn update(&self, engine: EngineStatus) {
        self.status.lock().engine = Some(engine);
    }

    /// Write the current status to the file atomically.
    ///
    /// Writes a temp file next to the target and renames it over the
    /// target. Creates the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn write(&self) -> Result<()> {
        // Serialize under the lock, write outside it
        let json = {
            let mut status = self.status.lock();
            status.updated_at = Utc::now();
            serde_json::to_string_pretty(&*status)?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;

        let cleanup_and_err = |e| {
            let _ = fs::remove_file(&temp_path);
            e
        };

        file.write_all(json.as_bytes()).map_err(cleanup_and_err)?;
        file.sync_all().map_err(cleanup_and_err)?;
        fs::rename(&temp_path, &self.path).map_err(cleanup_and_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::application::lifecycle::CounterSnapshot;

    fn engine_status() -> EngineStatus {
        let mut markets = BTreeMap::new();
        markets.insert("trading", 2);
        markets.insert("disputed", 1);
        EngineStatus {
            markets,
            providers: Vec::new(),
            counters: CounterSnapshot {
                trades_accepted: 7,
                disputed: 1,
                ..CounterSnapshot::default()
            },
            queue_capacity: 64,
        }
    }

    #[test]
    fn config_snapshot_reflects_key_source() {
        let mut config = Config::default();
        assert_eq!(StatusConfig::from(&config).verifying_key, "development");
        config.resolution.verifying_key_path = Some(PathBuf::from("vk.hex"));
        let snapshot = StatusConfig::from(&config);
        assert_eq!(snapshot.verifying_key, "file");
        assert_eq!(snapshot.quorum_min, 3);
    }

    #[test]
    fn write_is_atomic_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.json");
        let writer = StatusWriter::new(path.clone(), StatusConfig::from(&Config::default()));

        writer.write().unwrap();
        let first: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(first["version"], "1");
        assert!(first.get("engine").is_none());

        writer.update(engine_status());
        writer.write().unwrap();
        let second: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(second["engine"]["markets"]["trading"], 2);
        assert_eq!(second["engine"]["counters"]["trades_accepted"], 7);
        assert!(!path.with_extension("tmp").exists());
    }
}
