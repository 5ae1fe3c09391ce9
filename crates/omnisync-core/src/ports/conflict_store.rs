//! Conflict store port (driven/secondary port)
//!
//! Persists [`ConflictRecord`]s so that pending manual conflicts survive
//! restarts and stay visible to the operator until explicitly resolved.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::conflict::{ConflictRecord, Resolution};
use crate::domain::newtypes::TaskId;

use super::snapshot_store::StoreResult;

/// Persistence contract for conflict records.
#[async_trait]
pub trait IConflictStore: Send + Sync {
    /// Appends a newly detected conflict record.
    async fn record(&self, record: &ConflictRecord) -> StoreResult<()>;

    /// All pending (unresolved) records for a task, oldest first.
    async fn pending(&self, task_id: &TaskId) -> StoreResult<Vec<ConflictRecord>>;

    /// Records resolved by the operator but not yet applied by a pass,
    /// oldest first. The engine consumes these at the start of a pass.
    async fn unapplied(&self, task_id: &TaskId) -> StoreResult<Vec<ConflictRecord>>;

    /// Marks a record's resolution as applied to the sides.
    async fn mark_applied(&self, id: &Uuid) -> StoreResult<()>;

    /// Looks up a record by id across all tasks.
    async fn get(&self, id: &Uuid) -> StoreResult<Option<ConflictRecord>>;

    /// Marks a pending record resolved with the operator's decision.
    ///
    /// Returns the updated record, or `None` if no record with that id
    /// exists. Resolving an already-resolved record is a no-op.
    async fn resolve(&self, id: &Uuid, resolution: Resolution)
        -> StoreResult<Option<ConflictRecord>>;

    /// Returns an unapplied resolution to the pending state, e.g. when
    /// the engine found it cannot be enacted under the task's direction.
    /// The record shows up in `pending` again until re-resolved.
    async fn reopen(&self, id: &Uuid) -> StoreResult<()>;
}
