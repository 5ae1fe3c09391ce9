//! Omnisync Engine - Three-way diff and reconciliation
//!
//! Provides:
//! - Change classification against the last-synchronized snapshot
//! - Per-key action decisions, direction-aware
//! - Conflict resolution policies
//! - The pass runner: apply, record, commit
//!
//! ## Modules
//!
//! - [`diff`] - Pure classification and decision logic
//! - [`policy`] - Conflict policy evaluation
//! - [`namer`] - Keep-both conflict copy naming
//! - [`engine`] - The [`SyncEngine`](engine::SyncEngine) pass runner

pub mod diff;
pub mod engine;
pub mod namer;
pub mod policy;

use omnisync_core::domain::task::Side;
use omnisync_core::ports::{ConnectorError, StoreError};
use thiserror::Error;

/// Pass-level failures: the pass aborts with no snapshot mutation.
///
/// Per-key failures never surface here; they are recorded in the
/// [`SyncReport`](omnisync_core::domain::SyncReport) and the pass continues.
#[derive(Debug, Error)]
pub enum PassError {
    /// The initial item listing could not be read from one side
    #[error("Listing failed on side {side}: {source}")]
    Listing {
        /// Which side's connector failed
        side: Side,
        /// The connector error
        source: ConnectorError,
    },

    /// Loading the prior snapshot or committing the new one failed
    #[error("Snapshot store error: {0}")]
    Store(#[from] StoreError),

    /// Recording or querying conflict records failed
    #[error("Conflict store error: {0}")]
    ConflictStore(StoreError),

    /// The pass was cancelled between keys; nothing was committed
    #[error("Pass cancelled")]
    Cancelled,
}

impl PassError {
    /// Whether the failure indicates a corrupt persisted snapshot; the
    /// scheduler disables the task rather than retrying.
    #[must_use]
    pub fn is_corrupt_snapshot(&self) -> bool {
        matches!(self, PassError::Store(StoreError::Corrupt { .. }))
    }
}
