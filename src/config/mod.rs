//! Scheduler configuration, optionally loaded from a JSON file.
//!
//! Every field has a default, so a config file only needs the keys it
//! changes.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_EVENT_CAPACITY, DEFAULT_WORKER_NAME};

/// How a [`Scheduler`](crate::scheduler::Scheduler) is set up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Name of the worker thread.
    pub worker_name: String,
    /// Reject new invocations once this many are queued. `None` = unbounded.
    pub max_pending: Option<usize>,
    /// Start with the worker paused until [`resume`](crate::scheduler::Scheduler::resume).
    pub start_paused: bool,
    /// Per-subscriber event buffer.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            max_pending: None,
            start_paused: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("invalid config at {}", path.display()))
    }

    /// Parse and validate a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_name.trim().is_empty() {
            bail!("worker_name must not be empty");
        }
        if self.max_pending == Some(0) {
            bail!("max_pending must be at least 1");
        }
        if self.event_capacity == 0 {
            bail!("event_capacity must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid_and_unbounded() {
        let config = SchedulerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.worker_name, DEFAULT_WORKER_NAME);
        assert_eq!(config.max_pending, None);
        assert!(!config.start_paused);
    }

    #[test]
    fn empty_object_uses_defaults() {
        let config = SchedulerConfig::from_json("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn partial_object_overrides_given_keys() {
        let config =
            SchedulerConfig::from_json(r#"{"worker_name": "ledger", "max_pending": 8}"#).unwrap();
        assert_eq!(config.worker_name, "ledger");
        assert_eq!(config.max_pending, Some(8));
        assert_eq!(config.event_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(SchedulerConfig::from_json(r#"{"workers": 4}"#).is_err());
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(SchedulerConfig::from_json(r#"{"max_pending": 0}"#).is_err());
        assert!(SchedulerConfig::from_json(r#"{"event_capacity": 0}"#).is_err());
        assert!(SchedulerConfig::from_json(r#"{"worker_name": "  "}"#).is_err());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servitor.json");
        std::fs::write(&path, r#"{"start_paused": true}"#).unwrap();

        let config = SchedulerConfig::load(&path).unwrap();
        assert!(config.start_paused);
    }

    #[test]
    fn load_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let err = SchedulerConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
