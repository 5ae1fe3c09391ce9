//! Domain entities and value types
//!
//! Pure data model shared by the engine, stores, and scheduler. Nothing in
//! this module performs I/O.

pub mod action;
pub mod change;
pub mod conflict;
pub mod errors;
pub mod newtypes;
pub mod snapshot;
pub mod task;

pub use action::{KeyOutcome, SyncAction, SyncReport};
pub use change::{ChangeSet, ItemMeta, SideChange};
pub use conflict::{ConflictRecord, Resolution, ResolutionSource};
pub use errors::DomainError;
pub use newtypes::{Fingerprint, ItemKey, TaskId};
pub use snapshot::{Snapshot, SnapshotEntry};
pub use task::{ConflictPolicy, FilterSet, Side, SyncDirection, SyncTask, TaskSchedule};
