//! JSON pass report store
//!
//! One file per task holding the report from its most recent completed
//! pass, replaced whole on every save. `status` reads it so the last
//! pass's counters survive across processes.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use omnisync_core::domain::newtypes::TaskId;
use omnisync_core::domain::SyncReport;
use omnisync_core::ports::report_store::IReportStore;
use omnisync_core::ports::snapshot_store::{StoreError, StoreResult};

use crate::atomic_write;

/// Current on-disk format version.
const REPORT_FORMAT_VERSION: u32 = 1;

/// On-disk envelope around a task's last pass report.
#[derive(Debug, Serialize, Deserialize)]
struct ReportFile {
    version: u32,
    task_id: TaskId,
    report: SyncReport,
}

/// Report store over one JSON file per task under a state directory.
#[derive(Debug, Clone)]
pub struct JsonReportStore {
    state_dir: PathBuf,
}

impl JsonReportStore {
    /// Creates a store rooted at `state_dir`.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// The report file path for a task.
    #[must_use]
    pub fn path_for(&self, task_id: &TaskId) -> PathBuf {
        self.state_dir.join(format!("{}.report.json", task_id))
    }
}

#[async_trait]
impl IReportStore for JsonReportStore {
    #[instrument(skip(self, report), fields(task = %task_id))]
    async fn save(&self, task_id: &TaskId, report: &SyncReport) -> StoreResult<()> {
        let file = ReportFile {
            version: REPORT_FORMAT_VERSION,
            task_id: task_id.clone(),
            report: report.clone(),
        };
        let content = serde_json::to_vec_pretty(&file)?;
        atomic_write(&self.path_for(task_id), &content).await?;
        debug!("Pass report saved");
        Ok(())
    }

    async fn load(&self, task_id: &TaskId) -> StoreResult<Option<SyncReport>> {
        match tokio::fs::read_to_string(self.path_for(task_id)).await {
            Ok(content) => {
                let file: ReportFile =
                    serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                        task_id: task_id.clone(),
                        reason: e.to_string(),
                    })?;
                if file.version != REPORT_FORMAT_VERSION {
                    return Err(StoreError::Corrupt {
                        task_id: task_id.clone(),
                        reason: format!(
                            "unsupported report format version {} (expected {})",
                            file.version, REPORT_FORMAT_VERSION
                        ),
                    });
                }
                Ok(Some(file.report))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
