//! Port definitions (hexagonal architecture)
//!
//! Traits implemented by adapter crates: connectors expose a backend's
//! item set, stores persist snapshots and conflict records.

pub mod conflict_store;
pub mod connector;
pub mod report_store;
pub mod snapshot_store;

pub use conflict_store::IConflictStore;
pub use connector::{ConnectorError, IConnector};
pub use report_store::IReportStore;
pub use snapshot_store::{ISnapshotStore, StoreError};
