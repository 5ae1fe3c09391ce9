//! Shared command context
//!
//! Builds the object graph every command needs: settings, the task
//! registry, the engine over its JSON stores. Tasks declared in the
//! settings file are merged into the registry on open (added if absent),
//! so a hand-edited settings file and `task add` both end up in the same
//! place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use omnisync_core::config::Settings;
use omnisync_engine::engine::SyncEngine;
use omnisync_sched::TaskManager;
use omnisync_state::{JsonConflictStore, JsonReportStore, JsonSnapshotStore};

/// Default settings path when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "omnisync.json";

pub struct AppContext {
    pub settings: Settings,
    pub manager: Arc<TaskManager>,
    pub engine: Arc<SyncEngine>,
    pub snapshot_store: Arc<JsonSnapshotStore>,
    pub conflict_store: Arc<JsonConflictStore>,
    pub report_store: Arc<JsonReportStore>,
}

impl AppContext {
    /// Loads settings and opens the stores. An explicitly passed config
    /// path must load; the default path falls back to defaults when
    /// absent.
    pub async fn open(config: Option<&Path>) -> Result<Self> {
        let settings = match config {
            Some(path) => Settings::load(path)
                .with_context(|| format!("Failed to load settings from '{}'", path.display()))?,
            None => Settings::load_or_default(&PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        Self::from_settings(settings).await
    }

    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let manager = Arc::new(
            TaskManager::open(settings.state_dir.join("tasks.json"))
                .await
                .context("Failed to open task registry")?,
        );

        // Settings-declared tasks are additive; the registry keeps any
        // later edits made through `task` commands.
        for task in &settings.tasks {
            if manager.get(&task.id).await.is_none() {
                if let Err(e) = manager.add(task.clone()).await {
                    warn!(task = %task.id, error = %e, "Skipping settings-declared task");
                }
            } else {
                debug!(task = %task.id, "Settings task already registered");
            }
        }

        let snapshot_store = Arc::new(JsonSnapshotStore::new(&settings.state_dir));
        let conflict_store = Arc::new(JsonConflictStore::new(&settings.state_dir));
        let report_store = Arc::new(JsonReportStore::new(&settings.state_dir));
        let engine = Arc::new(SyncEngine::new(
            snapshot_store.clone(),
            conflict_store.clone(),
            report_store.clone(),
        ));

        Ok(Self {
            settings,
            manager,
            engine,
            snapshot_store,
            conflict_store,
            report_store,
        })
    }
}
