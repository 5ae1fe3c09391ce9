//! Omnisync Connectors - backend implementations of the connector port
//!
//! Two backends ship in-tree:
//! - [`LocalFolderConnector`](local::LocalFolderConnector) over a root
//!   directory on the local filesystem (`local://<path>`)
//! - [`InMemoryConnector`](memory::InMemoryConnector), a fault-injectable
//!   store used by tests and dry runs (`memory://<name>`)
//!
//! Remote backends (cloud drives, record stores) plug in behind the same
//! `IConnector` port and are resolved here once they exist.

pub mod local;
pub mod memory;

use std::sync::Arc;

use omnisync_core::domain::errors::DomainError;
use omnisync_core::domain::task::ConnectorRef;
use omnisync_core::ports::connector::IConnector;

pub use local::LocalFolderConnector;
pub use memory::InMemoryConnector;

use omnisync_core::domain::newtypes::Fingerprint;
use omnisync_core::ports::connector::{ConnectorError, ConnectorResult};
use sha2::{Digest, Sha256};

/// Finalizes a SHA-256 digest into the fingerprint form both backends use.
pub(crate) fn digest_fingerprint(hasher: Sha256) -> ConnectorResult<Fingerprint> {
    Fingerprint::new(format!("{:x}", hasher.finalize()))
        .map_err(|e| ConnectorError::Io(std::io::Error::other(e)))
}

/// Resolves a connector reference URI to a backend instance.
///
/// `memory://` targets resolve to a process-wide shared instance per name,
/// so two tasks (or a test and the code under test) referencing the same
/// name see the same items.
pub fn connector_for(reference: &ConnectorRef) -> Result<Arc<dyn IConnector>, DomainError> {
    match reference.scheme() {
        "local" => Ok(Arc::new(LocalFolderConnector::new(reference.target()))),
        "memory" => Ok(memory::shared(reference.target())),
        other => Err(DomainError::UnknownValue {
            field: "connector scheme".into(),
            value: other.into(),
        }),
    }
}
