//! Three-way diff: classification and action decision
//!
//! Pure functions only. Given the prior snapshot and both sides' current
//! listings, [`build_change_set`] classifies every key, and
//! [`decide_action`] turns a classification pair into exactly one
//! [`SyncAction`].

use std::collections::{BTreeMap, BTreeSet};

use omnisync_core::domain::newtypes::{Fingerprint, ItemKey};
use omnisync_core::domain::task::{Side, SyncDirection};
use omnisync_core::domain::{ChangeSet, ItemMeta, SideChange, Snapshot, SyncAction};

/// Both sides' listings, indexed by key. Tombstoned entries are dropped
/// at construction: the engine treats them as absent.
#[derive(Debug, Default)]
pub struct Listings {
    /// Side A's live items
    pub side_a: BTreeMap<ItemKey, ItemMeta>,
    /// Side B's live items
    pub side_b: BTreeMap<ItemKey, ItemMeta>,
}

impl Listings {
    /// Indexes raw listing results, discarding tombstones.
    pub fn new(side_a: Vec<ItemMeta>, side_b: Vec<ItemMeta>) -> Self {
        let index = |items: Vec<ItemMeta>| {
            items
                .into_iter()
                .filter(|m| !m.deleted)
                .map(|m| (m.key.clone(), m))
                .collect()
        };
        Self {
            side_a: index(side_a),
            side_b: index(side_b),
        }
    }

    /// The listing entry for a key on the given side.
    #[must_use]
    pub fn get(&self, side: Side, key: &ItemKey) -> Option<&ItemMeta> {
        match side {
            Side::A => self.side_a.get(key),
            Side::B => self.side_b.get(key),
        }
    }

    /// Current fingerprint for a key on the given side.
    #[must_use]
    pub fn fingerprint(&self, side: Side, key: &ItemKey) -> Option<&Fingerprint> {
        self.get(side, key).map(|m| &m.fingerprint)
    }
}

/// Classifies one side of a key against its snapshot fingerprint.
///
/// - absent now, absent then: `Unchanged`
/// - present now, absent then: `Created`
/// - present now, same fingerprint: `Unchanged`
/// - present now, different fingerprint: `Modified`
/// - absent now, present then: `Deleted`
#[must_use]
pub fn classify_side(recorded: Option<&Fingerprint>, current: Option<&Fingerprint>) -> SideChange {
    match (recorded, current) {
        (None, None) => SideChange::Unchanged,
        (None, Some(_)) => SideChange::Created,
        (Some(_), None) => SideChange::Deleted,
        (Some(then), Some(now)) => {
            if then == now {
                SideChange::Unchanged
            } else {
                SideChange::Modified
            }
        }
    }
}

/// Classifies every key in the union of {snapshot, side A, side B}.
#[must_use]
pub fn build_change_set(prior: &Snapshot, listings: &Listings) -> ChangeSet {
    let mut keys: BTreeSet<ItemKey> = BTreeSet::new();
    keys.extend(prior.keys().cloned());
    keys.extend(listings.side_a.keys().cloned());
    keys.extend(listings.side_b.keys().cloned());

    keys.into_iter()
        .map(|key| {
            let entry = prior.get(&key);
            let change_a = classify_side(
                entry.map(|e| &e.fingerprint_a),
                listings.fingerprint(Side::A, &key),
            );
            let change_b = classify_side(
                entry.map(|e| &e.fingerprint_b),
                listings.fingerprint(Side::B, &key),
            );
            (key, (change_a, change_b))
        })
        .collect()
}

/// Decides the action for one key from its classification pair.
///
/// `convergent` is whether both sides currently hold the same fingerprint
/// (only meaningful when both are present). Direction restricts which
/// side's changes may propagate: a change on the receive-only side of a
/// one-way task yields `Skip`.
#[must_use]
pub fn decide_action(
    change_a: SideChange,
    change_b: SideChange,
    convergent: bool,
    direction: SyncDirection,
) -> SyncAction {
    use SideChange::{Created, Deleted, Modified, Unchanged};

    match (change_a, change_b) {
        (Unchanged, Unchanged) => SyncAction::Skip,
        (Deleted, Deleted) => SyncAction::Skip,

        // One side changed, the other untouched: propagate if allowed.
        (Created | Modified, Unchanged) => {
            if direction.allows_from(Side::A) {
                SyncAction::CopyAToB
            } else {
                SyncAction::Skip
            }
        }
        (Unchanged, Created | Modified) => {
            if direction.allows_from(Side::B) {
                SyncAction::CopyBToA
            } else {
                SyncAction::Skip
            }
        }
        (Deleted, Unchanged) => {
            if direction.allows_from(Side::A) {
                SyncAction::DeleteB
            } else {
                SyncAction::Skip
            }
        }
        (Unchanged, Deleted) => {
            if direction.allows_from(Side::B) {
                SyncAction::DeleteA
            } else {
                SyncAction::Skip
            }
        }

        // Both sides hold new content.
        (Created | Modified, Created | Modified) => {
            if convergent {
                SyncAction::Skip
            } else {
                SyncAction::Conflict
            }
        }

        // Edit on one side, delete on the other.
        (Created | Modified, Deleted) | (Deleted, Created | Modified) => SyncAction::Conflict,
    }
}
