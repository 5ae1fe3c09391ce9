//! Snapshot: the three-way diff base
//!
//! A [`Snapshot`] records, per key, the fingerprint pair observed on both
//! sides at the end of the last successful pass. It is the "base" of the
//! three-way diff: a side is considered changed when its current
//! fingerprint differs from the one recorded here.
//!
//! Invariant: a snapshot always reflects state that was actually applied
//! and committed to both sides. It is replaced atomically at the end of a
//! pass, never patched in place.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Fingerprint, ItemKey};

/// One synchronized key: the fingerprint pair at last sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Fingerprint observed on side A after the last applied action
    pub fingerprint_a: Fingerprint,
    /// Fingerprint observed on side B after the last applied action
    pub fingerprint_b: Fingerprint,
    /// When the pair was last brought into agreement
    pub last_synced: DateTime<Utc>,
}

impl SnapshotEntry {
    /// Creates an entry timestamped now.
    pub fn new(fingerprint_a: Fingerprint, fingerprint_b: Fingerprint) -> Self {
        Self {
            fingerprint_a,
            fingerprint_b,
            last_synced: Utc::now(),
        }
    }
}

/// Last-known-synchronized state for one task.
///
/// Ordered by key so the persisted form is stable and diffs cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: BTreeMap<ItemKey, SnapshotEntry>,
}

impl Snapshot {
    /// Creates an empty snapshot (first-run semantics: every listed item
    /// will classify as `created` on its side).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Looks up the recorded entry for a key.
    #[must_use]
    pub fn get(&self, key: &ItemKey) -> Option<&SnapshotEntry> {
        self.entries.get(key)
    }

    /// Inserts or replaces the entry for a key.
    pub fn insert(&mut self, key: ItemKey, entry: SnapshotEntry) {
        self.entries.insert(key, entry);
    }

    /// Removes the entry for a key (the key converged on "absent").
    pub fn remove(&mut self, key: &ItemKey) -> Option<SnapshotEntry> {
        self.entries.remove(key)
    }

    /// Whether any key is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of recorded keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over recorded keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &ItemKey> {
        self.entries.keys()
    }

    /// Iterates over (key, entry) pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemKey, &SnapshotEntry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ItemKey {
        ItemKey::new(s).unwrap()
    }

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::new(s).unwrap()
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = Snapshot::empty();
        assert!(snap.is_empty());
        assert_eq!(snap.len(), 0);
        assert!(snap.get(&key("f1")).is_none());
    }

    #[test]
    fn test_insert_and_get() {
        let mut snap = Snapshot::empty();
        snap.insert(key("f1"), SnapshotEntry::new(fp("h1"), fp("h1")));

        let entry = snap.get(&key("f1")).unwrap();
        assert_eq!(entry.fingerprint_a, fp("h1"));
        assert_eq!(entry.fingerprint_b, fp("h1"));
    }

    #[test]
    fn test_remove() {
        let mut snap = Snapshot::empty();
        snap.insert(key("f1"), SnapshotEntry::new(fp("h1"), fp("h1")));
        assert!(snap.remove(&key("f1")).is_some());
        assert!(snap.is_empty());
        assert!(snap.remove(&key("f1")).is_none());
    }

    #[test]
    fn test_keys_ordered() {
        let mut snap = Snapshot::empty();
        snap.insert(key("b"), SnapshotEntry::new(fp("h"), fp("h")));
        snap.insert(key("a"), SnapshotEntry::new(fp("h"), fp("h")));
        let keys: Vec<_> = snap.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut snap = Snapshot::empty();
        snap.insert(key("f1"), SnapshotEntry::new(fp("h1"), fp("h2")));

        let json = serde_json::to_string(&snap).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
