//! Decided actions and the per-pass report
//!
//! The engine decides exactly one [`SyncAction`] per key per pass, then
//! records how each key actually fared in a [`SyncReport`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::newtypes::ItemKey;

/// The operation decided for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    /// Propagate side A's version to side B
    CopyAToB,
    /// Propagate side B's version to side A
    CopyBToA,
    /// Remove the item from side A
    DeleteA,
    /// Remove the item from side B
    DeleteB,
    /// Both sides changed divergently; needs a policy decision
    Conflict,
    /// Nothing to do (already convergent, filtered, or deferred)
    Skip,
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncAction::CopyAToB => "copy_a_to_b",
            SyncAction::CopyBToA => "copy_b_to_a",
            SyncAction::DeleteA => "delete_a",
            SyncAction::DeleteB => "delete_b",
            SyncAction::Conflict => "conflict",
            SyncAction::Skip => "skip",
        };
        write!(f, "{}", s)
    }
}

/// What actually happened to one key during apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyOutcome {
    /// Content was copied to the other side
    Copied,
    /// The item was deleted on one side
    Deleted,
    /// No work was needed
    Skipped,
    /// A conflict was detected (possibly auto-resolved; see the record)
    Conflicted,
    /// The action failed; the key keeps its prior snapshot entry
    Failed {
        /// Human-readable reason, for the report and the operator
        reason: String,
    },
}

/// Summary of one completed pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Number of keys whose content was copied across
    pub copied: u32,
    /// Number of keys deleted on one side
    pub deleted: u32,
    /// Number of keys skipped (convergent or filtered)
    pub skipped: u32,
    /// Number of keys that raised a conflict this pass
    pub conflicts: u32,
    /// Number of keys whose action failed
    pub failed: u32,
    /// Outcome per key, in key order
    pub outcomes: BTreeMap<ItemKey, KeyOutcome>,
    /// Non-fatal errors encountered during the pass
    pub errors: Vec<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl SyncReport {
    /// Records an outcome for a key and bumps the matching counter.
    pub fn record(&mut self, key: ItemKey, outcome: KeyOutcome) {
        match &outcome {
            KeyOutcome::Copied => self.copied += 1,
            KeyOutcome::Deleted => self.deleted += 1,
            KeyOutcome::Skipped => self.skipped += 1,
            KeyOutcome::Conflicted => self.conflicts += 1,
            KeyOutcome::Failed { reason } => {
                self.failed += 1;
                self.errors.push(format!("{key}: {reason}"));
            }
        }
        self.outcomes.insert(key, outcome);
    }

    /// Total keys considered in the pass.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether every key either succeeded or was skipped.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
