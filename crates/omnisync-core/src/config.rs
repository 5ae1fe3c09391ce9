//! Configuration module for Omnisync.
//!
//! Typed settings that map to the JSON settings file, with loading,
//! validation, and defaults. Task definitions are validated here, at
//! creation time, so the engine and scheduler can assume well-formed
//! options.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::task::SyncTask;
use crate::domain::DomainError;

/// Top-level settings for Omnisync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding snapshots, conflict records, and the task set.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Task definitions loaded at startup.
    #[serde(default)]
    pub tasks: Vec<SyncTask>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    pub json: bool,
}

/// Scheduler behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Seconds to wait for in-flight passes when stopping gracefully
    /// before cancellation kicks in.
    pub shutdown_grace_secs: u64,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".omnisync")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            logging: LoggingSettings::default(),
            scheduler: SchedulerSettings::default(),
            tasks: Vec::new(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Try to load from `path`; fall back to [`Settings::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Save settings as pretty-printed JSON to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates every task definition and rejects duplicate task ids.
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut seen = BTreeSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !seen.insert(&task.id) {
                return Err(DomainError::ValidationFailed(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::newtypes::TaskId;
    use crate::domain::task::ConnectorRef;

    fn sample_task(id: &str) -> SyncTask {
        SyncTask::new(
            TaskId::new(id).unwrap(),
            ConnectorRef::new("local:///a").unwrap(),
            ConnectorRef::new("local:///b").unwrap(),
        )
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.scheduler.shutdown_grace_secs, 30);
        assert!(settings.tasks.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_duplicate_task_ids_rejected() {
        let settings = Settings {
            tasks: vec![sample_task("t1"), sample_task("t1")],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings {
            tasks: vec![sample_task("docs")],
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].id.as_str(), "docs");
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let settings = Settings::load_or_default(Path::new("/nonexistent/settings.json"));
        assert!(settings.tasks.is_empty());
    }

    #[test]
    fn test_load_rejects_invalid_task() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "logging": {"level": "info", "json": false},
                "scheduler": {"shutdown_grace_secs": 5},
                "tasks": [{
                    "id": "self-pair",
                    "side_a": "local:///same",
                    "side_b": "local:///same"
                }]
            }"#,
        )
        .unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
