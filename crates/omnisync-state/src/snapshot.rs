//! JSON snapshot store
//!
//! One versioned file per task. A missing file is first-run semantics
//! (empty snapshot); a file that exists but does not decode is
//! [`StoreError::Corrupt`] and is surfaced, never silently replaced.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use omnisync_core::domain::newtypes::TaskId;
use omnisync_core::domain::Snapshot;
use omnisync_core::ports::snapshot_store::{ISnapshotStore, StoreError, StoreResult};

use crate::atomic_write;

/// Current on-disk format version.
const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// On-disk envelope around a snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    task_id: TaskId,
    entries: Snapshot,
}

/// Snapshot store over one JSON file per task under a state directory.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    state_dir: PathBuf,
}

impl JsonSnapshotStore {
    /// Creates a store rooted at `state_dir`. The directory is created
    /// lazily on first commit.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// The snapshot file path for a task.
    #[must_use]
    pub fn path_for(&self, task_id: &TaskId) -> PathBuf {
        self.state_dir.join(format!("{}.snapshot.json", task_id))
    }

    fn decode(task_id: &TaskId, content: &str) -> StoreResult<Snapshot> {
        let file: SnapshotFile =
            serde_json::from_str(content).map_err(|e| StoreError::Corrupt {
                task_id: task_id.clone(),
                reason: e.to_string(),
            })?;
        if file.version != SNAPSHOT_FORMAT_VERSION {
            return Err(StoreError::Corrupt {
                task_id: task_id.clone(),
                reason: format!(
                    "unsupported snapshot format version {} (expected {})",
                    file.version, SNAPSHOT_FORMAT_VERSION
                ),
            });
        }
        Ok(file.entries)
    }
}

#[async_trait]
impl ISnapshotStore for JsonSnapshotStore {
    #[instrument(skip(self), fields(task = %task_id))]
    async fn load(&self, task_id: &TaskId) -> StoreResult<Snapshot> {
        let path = self.path_for(task_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let snapshot = Self::decode(task_id, &content)?;
                debug!(entries = snapshot.len(), "Snapshot loaded");
                Ok(snapshot)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No snapshot on disk, first run");
                Ok(Snapshot::empty())
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    #[instrument(skip(self, snapshot), fields(task = %task_id, entries = snapshot.len()))]
    async fn commit(&self, task_id: &TaskId, snapshot: &Snapshot) -> StoreResult<()> {
        let file = SnapshotFile {
            version: SNAPSHOT_FORMAT_VERSION,
            task_id: task_id.clone(),
            entries: snapshot.clone(),
        };
        let content = serde_json::to_vec_pretty(&file)?;
        atomic_write(&self.path_for(task_id), &content).await?;
        debug!("Snapshot committed");
        Ok(())
    }
}
