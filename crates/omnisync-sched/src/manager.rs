//! Task registry
//!
//! Holds the configured sync tasks behind a `RwLock<BTreeMap>`: reads
//! (`list`, `get`) run concurrently, mutation is exclusive. Every mutation
//! is persisted to `tasks.json` with an atomic replace before it returns,
//! so a crash never loses an acknowledged change.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use omnisync_core::domain::errors::DomainError;
use omnisync_core::domain::newtypes::TaskId;
use omnisync_core::domain::task::SyncTask;
use omnisync_state::atomic_write;

const REGISTRY_FORMAT_VERSION: u32 = 1;

/// Errors raised by registry operations
#[derive(Debug, Error)]
pub enum ManagerError {
    /// A task with this id is already registered
    #[error("Task '{0}' already exists")]
    DuplicateTask(TaskId),

    /// No task with this id is registered
    #[error("Task '{0}' not found")]
    UnknownTask(TaskId),

    /// The task definition failed validation
    #[error(transparent)]
    Invalid(#[from] DomainError),

    /// Persisting or reloading the registry failed
    #[error("Task registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The registry file exists but cannot be decoded at all
    #[error("Task registry is corrupt: {0}")]
    Corrupt(String),
}

/// On-disk envelope. Entries are kept as raw values so one undecodable
/// task is skipped instead of losing the whole registry.
#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    version: u32,
    tasks: Vec<serde_json::Value>,
}

/// In-memory task registry with JSON persistence.
#[derive(Debug)]
pub struct TaskManager {
    path: PathBuf,
    tasks: RwLock<BTreeMap<TaskId, SyncTask>>,
}

impl TaskManager {
    /// Opens the registry at `path` (conventionally
    /// `<state_dir>/tasks.json`), reloading any persisted task set. A
    /// missing file is an empty registry; entries that no longer decode
    /// or validate are logged and skipped.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self, ManagerError> {
        let path = path.as_ref().to_path_buf();
        let tasks = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let file: RegistryFile =
                    serde_json::from_str(&content).map_err(|e| ManagerError::Corrupt(e.to_string()))?;
                if file.version != REGISTRY_FORMAT_VERSION {
                    return Err(ManagerError::Corrupt(format!(
                        "unsupported registry format version {} (expected {})",
                        file.version, REGISTRY_FORMAT_VERSION
                    )));
                }
                let mut tasks = BTreeMap::new();
                for value in file.tasks {
                    match serde_json::from_value::<SyncTask>(value) {
                        Ok(task) => match task.validate() {
                            Ok(()) => {
                                tasks.insert(task.id.clone(), task);
                            }
                            Err(e) => {
                                warn!(task = %task.id, error = %e, "Skipping invalid persisted task");
                            }
                        },
                        Err(e) => {
                            warn!(error = %e, "Skipping undecodable persisted task entry");
                        }
                    }
                }
                info!(tasks = tasks.len(), "Task registry loaded");
                tasks
            }
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(ManagerError::Io(e)),
        };

        Ok(Self {
            path,
            tasks: RwLock::new(tasks),
        })
    }

    /// Registers a new task. Rejects duplicates and invalid definitions.
    #[instrument(skip(self, task), fields(task = %task.id))]
    pub async fn add(&self, task: SyncTask) -> Result<(), ManagerError> {
        task.validate()?;
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(ManagerError::DuplicateTask(task.id));
        }
        tasks.insert(task.id.clone(), task);
        self.persist(&tasks).await?;
        info!("Task registered");
        Ok(())
    }

    /// Removes a task, returning its definition.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &TaskId) -> Result<SyncTask, ManagerError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .remove(id)
            .ok_or_else(|| ManagerError::UnknownTask(id.clone()))?;
        self.persist(&tasks).await?;
        info!("Task removed");
        Ok(task)
    }

    /// The task definition for an id, if registered.
    pub async fn get(&self, id: &TaskId) -> Option<SyncTask> {
        self.tasks.read().await.get(id).cloned()
    }

    /// All registered tasks, ordered by id.
    pub async fn list(&self) -> Vec<SyncTask> {
        self.tasks.read().await.values().cloned().collect()
    }

    /// Enables or disables a task without touching the rest of its
    /// definition.
    #[instrument(skip(self))]
    pub async fn set_enabled(&self, id: &TaskId, enabled: bool) -> Result<(), ManagerError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| ManagerError::UnknownTask(id.clone()))?;
        task.enabled = enabled;
        self.persist(&tasks).await?;
        info!(enabled, "Task enablement changed");
        Ok(())
    }

    async fn persist(&self, tasks: &BTreeMap<TaskId, SyncTask>) -> Result<(), ManagerError> {
        let entries: Result<Vec<serde_json::Value>, _> =
            tasks.values().map(serde_json::to_value).collect();
        let file = RegistryFile {
            version: REGISTRY_FORMAT_VERSION,
            tasks: entries.map_err(|e| ManagerError::Corrupt(e.to_string()))?,
        };
        let content = serde_json::to_vec_pretty(&file)
            .map_err(|e| ManagerError::Corrupt(e.to_string()))?;
        atomic_write(&self.path, &content).await?;
        Ok(())
    }
}
