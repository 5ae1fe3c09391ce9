//! Pass report store port (driven/secondary port)
//!
//! Persists the most recent [`SyncReport`] per task so `status` can show
//! what the last pass did without a live scheduler in the process.

use async_trait::async_trait;

use crate::domain::newtypes::TaskId;
use crate::domain::SyncReport;

use super::snapshot_store::StoreResult;

/// Persistence contract for the last completed pass report per task.
#[async_trait]
pub trait IReportStore: Send + Sync {
    /// Replaces the stored report for a task.
    async fn save(&self, task_id: &TaskId, report: &SyncReport) -> StoreResult<()>;

    /// The last stored report; `None` if the task has never completed a
    /// pass.
    async fn load(&self, task_id: &TaskId) -> StoreResult<Option<SyncReport>>;
}
