//! Snapshot store port (driven/secondary port)
//!
//! Persists the last-known-synchronized snapshot per task. The store is
//! the only state shared across concurrent task runs; snapshots are keyed
//! by task id so commits for different tasks never contend.
//!
//! ## Contract
//!
//! - `load` for an unknown task returns an empty snapshot (first-run
//!   semantics).
//! - `commit` replaces the whole record atomically and is durable before
//!   it returns; a concurrent `load` never observes a partial write.
//! - A corrupt persisted snapshot surfaces as [`StoreError::Corrupt`] and
//!   is never silently replaced with an empty one: resetting the base of
//!   the three-way diff would reclassify every item as `created` and risk
//!   a mass re-copy or mass delete.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::newtypes::TaskId;
use crate::domain::Snapshot;

/// Errors a snapshot store can raise
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persisted record exists but cannot be decoded
    #[error("Snapshot for task '{task_id}' is corrupt: {reason}")]
    Corrupt {
        /// Task whose record failed to decode
        task_id: TaskId,
        /// Decode failure detail
        reason: String,
    },

    /// Underlying storage failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure while committing
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract for per-task snapshots.
#[async_trait]
pub trait ISnapshotStore: Send + Sync {
    /// Loads the snapshot for a task; empty if the task has never synced.
    async fn load(&self, task_id: &TaskId) -> StoreResult<Snapshot>;

    /// Atomically replaces the task's snapshot.
    async fn commit(&self, task_id: &TaskId, snapshot: &Snapshot) -> StoreResult<()>;
}
