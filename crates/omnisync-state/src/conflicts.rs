//! JSON conflict store
//!
//! One file per task holding every conflict record, pending and resolved.
//! Records survive restarts so pending manual conflicts stay visible to
//! the operator, and operator resolutions stay queued for the next pass.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use uuid::Uuid;

use omnisync_core::domain::conflict::{ConflictRecord, Resolution, ResolutionSource};
use omnisync_core::domain::newtypes::TaskId;
use omnisync_core::ports::conflict_store::IConflictStore;
use omnisync_core::ports::snapshot_store::{StoreError, StoreResult};

use crate::atomic_write;

/// Current on-disk format version.
const CONFLICTS_FORMAT_VERSION: u32 = 1;

/// On-disk envelope around a task's conflict records.
#[derive(Debug, Serialize, Deserialize)]
struct ConflictsFile {
    version: u32,
    task_id: TaskId,
    records: Vec<ConflictRecord>,
}

/// Conflict store over one JSON file per task under a state directory.
pub struct JsonConflictStore {
    state_dir: PathBuf,
    // Serializes read-modify-write cycles within this process; cross-file
    // atomicity comes from atomic_write.
    write_lock: Mutex<()>,
}

impl JsonConflictStore {
    /// Creates a store rooted at `state_dir`.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The conflicts file path for a task.
    #[must_use]
    pub fn path_for(&self, task_id: &TaskId) -> PathBuf {
        self.state_dir.join(format!("{}.conflicts.json", task_id))
    }

    async fn load_records(&self, task_id: &TaskId) -> StoreResult<Vec<ConflictRecord>> {
        match tokio::fs::read_to_string(self.path_for(task_id)).await {
            Ok(content) => {
                let file: ConflictsFile =
                    serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                        task_id: task_id.clone(),
                        reason: e.to_string(),
                    })?;
                if file.version != CONFLICTS_FORMAT_VERSION {
                    return Err(StoreError::Corrupt {
                        task_id: task_id.clone(),
                        reason: format!(
                            "unsupported conflicts format version {} (expected {})",
                            file.version, CONFLICTS_FORMAT_VERSION
                        ),
                    });
                }
                Ok(file.records)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn save_records(
        &self,
        task_id: &TaskId,
        records: Vec<ConflictRecord>,
    ) -> StoreResult<()> {
        let file = ConflictsFile {
            version: CONFLICTS_FORMAT_VERSION,
            task_id: task_id.clone(),
            records,
        };
        let content = serde_json::to_vec_pretty(&file)?;
        atomic_write(&self.path_for(task_id), &content).await?;
        Ok(())
    }

    /// Task ids that have a conflicts file on disk.
    async fn known_tasks(&self) -> StoreResult<Vec<TaskId>> {
        let mut tasks = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.state_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(tasks),
            Err(e) => return Err(StoreError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(stem) = name.strip_suffix(".conflicts.json") {
                if let Ok(task_id) = TaskId::new(stem) {
                    tasks.push(task_id);
                }
            }
        }
        tasks.sort();
        Ok(tasks)
    }

    /// Finds the task file containing a record id.
    async fn locate(&self, id: &Uuid) -> StoreResult<Option<(TaskId, Vec<ConflictRecord>)>> {
        for task_id in self.known_tasks().await? {
            let records = self.load_records(&task_id).await?;
            if records.iter().any(|r| &r.id == id) {
                return Ok(Some((task_id, records)));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl IConflictStore for JsonConflictStore {
    #[instrument(skip(self, record), fields(task = %record.task_id, key = %record.key))]
    async fn record(&self, record: &ConflictRecord) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_records(&record.task_id).await?;
        records.push(record.clone());
        self.save_records(&record.task_id, records).await?;
        debug!("Conflict recorded");
        Ok(())
    }

    async fn pending(&self, task_id: &TaskId) -> StoreResult<Vec<ConflictRecord>> {
        let records = self.load_records(task_id).await?;
        Ok(records.into_iter().filter(|r| r.is_pending()).collect())
    }

    async fn unapplied(&self, task_id: &TaskId) -> StoreResult<Vec<ConflictRecord>> {
        let records = self.load_records(task_id).await?;
        Ok(records.into_iter().filter(|r| r.is_unapplied()).collect())
    }

    async fn get(&self, id: &Uuid) -> StoreResult<Option<ConflictRecord>> {
        Ok(self
            .locate(id)
            .await?
            .and_then(|(_, records)| records.into_iter().find(|r| &r.id == id)))
    }

    #[instrument(skip(self))]
    async fn resolve(
        &self,
        id: &Uuid,
        resolution: Resolution,
    ) -> StoreResult<Option<ConflictRecord>> {
        let _guard = self.write_lock.lock().await;
        let Some((task_id, mut records)) = self.locate(id).await? else {
            return Ok(None);
        };

        let mut updated = None;
        for record in &mut records {
            if &record.id == id {
                *record = record
                    .clone()
                    .resolve(resolution, ResolutionSource::Operator);
                updated = Some(record.clone());
            }
        }
        self.save_records(&task_id, records).await?;
        debug!(resolved = updated.is_some(), "Resolution stored");
        Ok(updated)
    }

    async fn mark_applied(&self, id: &Uuid) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let Some((task_id, mut records)) = self.locate(id).await? else {
            return Ok(());
        };
        for record in &mut records {
            if &record.id == id {
                *record = record.clone().mark_applied();
            }
        }
        self.save_records(&task_id, records).await
    }

    #[instrument(skip(self))]
    async fn reopen(&self, id: &Uuid) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let Some((task_id, mut records)) = self.locate(id).await? else {
            return Ok(());
        };
        for record in &mut records {
            if &record.id == id {
                *record = record.clone().reopen();
            }
        }
        self.save_records(&task_id, records).await?;
        debug!("Resolution reopened");
        Ok(())
    }
}
