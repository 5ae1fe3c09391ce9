//! Connector port (driven/secondary port)
//!
//! A connector exposes one side of a sync task: it can list the current
//! item set and read, write, and delete individual items. Backends (local
//! folders, cloud stores, record stores) each implement this one trait;
//! the engine never sees anything more specific.
//!
//! ## Error semantics
//!
//! The taxonomy matters to the engine:
//! - [`ConnectorError::Unavailable`] is transient. During listing it aborts
//!   the whole pass; during an action it fails only that key.
//! - [`ConnectorError::ItemNotFound`] means a key vanished mid-pass and is
//!   treated as a delete classification, not a failure.
//! - [`ConnectorError::PermissionDenied`] is fatal for that key and not
//!   retriable until configuration changes.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::newtypes::{Fingerprint, ItemKey};
use crate::domain::task::FilterSet;
use crate::domain::ItemMeta;

/// Errors a connector operation can raise
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The backend cannot be reached right now (network down, store locked)
    #[error("Connector unavailable: {0}")]
    Unavailable(String),

    /// The requested key does not exist on this side
    #[error("Item not found: {0}")]
    ItemNotFound(ItemKey),

    /// The backend refused the operation for this key
    #[error("Permission denied: {0}")]
    PermissionDenied(ItemKey),

    /// An I/O error not covered by the cases above
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// Whether the error is transient and worth retrying on a later pass.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectorError::Unavailable(_))
    }
}

/// Result alias for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Capability contract for one side of a sync task.
///
/// Implementations must be safe to share across tasks (`Send + Sync`);
/// the engine holds them behind `Arc<dyn IConnector>`.
#[async_trait]
pub trait IConnector: Send + Sync {
    /// Lists the current item set, restricted by the task's filter.
    ///
    /// Tombstoned entries (`deleted == true`) are included when the backend
    /// tracks deletions explicitly; the engine treats them as absent.
    async fn list_items(&self, filter: &FilterSet) -> ConnectorResult<Vec<ItemMeta>>;

    /// Reads the payload for a key.
    async fn read(&self, key: &ItemKey) -> ConnectorResult<Vec<u8>>;

    /// Writes a payload for a key, returning the fingerprint of what was
    /// durably stored. The returned fingerprint is authoritative: the
    /// engine records it in the snapshot rather than assuming the source
    /// side's fingerprint survived the transfer.
    async fn write(&self, key: &ItemKey, payload: &[u8]) -> ConnectorResult<Fingerprint>;

    /// Deletes the item for a key. Deleting an absent key is an
    /// [`ConnectorError::ItemNotFound`], which callers may ignore.
    async fn delete(&self, key: &ItemKey) -> ConnectorResult<()>;
}
