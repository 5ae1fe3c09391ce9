//! Change detection types
//!
//! [`ItemMeta`] is what a connector reports for one item during listing.
//! [`SideChange`] classifies one side of a key against the prior snapshot,
//! and [`ChangeSet`] holds the classification for a whole pass.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Fingerprint, ItemKey};

/// One listing entry from a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Cross-side identity
    pub key: ItemKey,
    /// Side-local opaque identifier (path, record id, etc.)
    pub id: String,
    /// Change-detection token for the current version
    pub fingerprint: Fingerprint,
    /// Tombstone: the backend remembers the item but it has been removed
    pub deleted: bool,
    /// Modification timestamp, when the backend supplies one.
    ///
    /// Required by the `prefer_newer` conflict policy; connectors that
    /// cannot supply it leave this `None` and `prefer_newer` degrades to
    /// manual resolution for their items.
    pub modified_at: Option<DateTime<Utc>>,
}

impl ItemMeta {
    /// Convenience constructor for a live (non-tombstoned) item.
    pub fn new(key: ItemKey, id: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            key,
            id: id.into(),
            fingerprint,
            deleted: false,
            modified_at: None,
        }
    }

    /// Sets the modification timestamp.
    #[must_use]
    pub fn with_modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.modified_at = Some(at);
        self
    }

    /// Marks the entry as a tombstone.
    #[must_use]
    pub fn tombstone(mut self) -> Self {
        self.deleted = true;
        self
    }
}

/// Classification of one side of a key relative to the prior snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideChange {
    /// Fingerprint equals the snapshot entry, or absent on both now and then
    Unchanged,
    /// Present now, absent in the snapshot
    Created,
    /// Present in both, fingerprint differs from the snapshot
    Modified,
    /// Absent now (or tombstoned), present in the snapshot
    Deleted,
}

impl SideChange {
    /// Whether this side diverged from the snapshot.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        !matches!(self, SideChange::Unchanged)
    }
}

impl std::fmt::Display for SideChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SideChange::Unchanged => "unchanged",
            SideChange::Created => "created",
            SideChange::Modified => "modified",
            SideChange::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

/// Per-key change classification for one pass: key -> (side A, side B).
pub type ChangeSet = BTreeMap<ItemKey, (SideChange, SideChange)>;
