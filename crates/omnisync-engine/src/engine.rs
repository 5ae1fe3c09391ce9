//! The pass runner
//!
//! [`SyncEngine::run_pass`] executes one reconciliation pass for a task:
//! list both sides, classify against the prior snapshot, decide and apply
//! one action per key, and commit the new snapshot.
//!
//! ## Failure containment
//!
//! - A listing failure on either side aborts the pass before anything is
//!   written (fail-closed: no snapshot mutation).
//! - A per-key action failure is recorded in the report and the pass
//!   continues; the failed key keeps its prior snapshot entry so it is
//!   re-evaluated next pass.
//! - Cancellation is honored between keys only; an in-progress single-key
//!   operation always runs to completion to avoid partial item writes.
//!
//! ## Ordering
//!
//! Within a key, content writes always precede deletes: a keep-both
//! resolution writes the preserved copy before the winning version
//! overwrites the original, so an interruption can lose ordering progress
//! but never content.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use omnisync_core::domain::conflict::{ConflictRecord, Resolution, ResolutionSource};
use omnisync_core::domain::newtypes::{Fingerprint, ItemKey};
use omnisync_core::domain::task::{Side, SyncTask};
use omnisync_core::domain::{KeyOutcome, SideChange, Snapshot, SnapshotEntry, SyncAction, SyncReport};
use omnisync_core::ports::{
    ConnectorError, IConflictStore, IConnector, IReportStore, ISnapshotStore,
};

use crate::diff::{build_change_set, decide_action, Listings};
use crate::namer::conflict_copy_key;
use crate::{policy, PassError};

/// Everything a completed pass produced.
#[derive(Debug)]
pub struct PassOutcome {
    /// The committed snapshot
    pub snapshot: Snapshot,
    /// Conflict records created during this pass
    pub conflicts: Vec<ConflictRecord>,
    /// Per-key outcomes and counters
    pub report: SyncReport,
}

/// How one key's outcome affects the new snapshot.
enum SnapUpdate {
    /// Retain whatever the prior snapshot recorded
    Keep,
    /// Record this fingerprint pair
    Set(SnapshotEntry),
    /// Drop the key (converged on "absent")
    Remove,
}

/// What a cross-side copy produced.
enum CopyResult {
    /// Fingerprints observed after the write
    Applied {
        src_fingerprint: Fingerprint,
        dst_fingerprint: Fingerprint,
    },
    /// The source item vanished between listing and read; treated as a
    /// delete classification next pass
    SourceVanished,
}

/// Reconciliation engine driving one task pass at a time.
///
/// Holds the stores; connectors are supplied per pass because they are
/// task-specific. Safe to share across concurrent task runs.
pub struct SyncEngine {
    snapshot_store: Arc<dyn ISnapshotStore>,
    conflict_store: Arc<dyn IConflictStore>,
    report_store: Arc<dyn IReportStore>,
}

impl SyncEngine {
    /// Creates an engine over the given stores.
    pub fn new(
        snapshot_store: Arc<dyn ISnapshotStore>,
        conflict_store: Arc<dyn IConflictStore>,
        report_store: Arc<dyn IReportStore>,
    ) -> Self {
        Self {
            snapshot_store,
            conflict_store,
            report_store,
        }
    }

    /// Runs one pass for `task` between `connector_a` and `connector_b`.
    ///
    /// On success the new snapshot has been committed. On any
    /// [`PassError`] the persisted snapshot is untouched.
    #[instrument(skip_all, fields(task = %task.id))]
    pub async fn run_pass(
        &self,
        task: &SyncTask,
        connector_a: Arc<dyn IConnector>,
        connector_b: Arc<dyn IConnector>,
        cancel: &CancellationToken,
    ) -> Result<PassOutcome, PassError> {
        let start = Instant::now();
        let prior = self.snapshot_store.load(&task.id).await?;

        // Operator decisions waiting to be enacted, and keys still blocked
        // on a manual decision.
        let overrides: BTreeMap<ItemKey, ConflictRecord> = self
            .conflict_store
            .unapplied(&task.id)
            .await
            .map_err(PassError::ConflictStore)?
            .into_iter()
            .map(|r| (r.key.clone(), r))
            .collect();
        let blocked: Vec<ItemKey> = self
            .conflict_store
            .pending(&task.id)
            .await
            .map_err(PassError::ConflictStore)?
            .into_iter()
            .map(|r| r.key)
            .collect();

        let (listed_a, listed_b) = tokio::join!(
            connector_a.list_items(&task.filters),
            connector_b.list_items(&task.filters),
        );
        let listed_a = listed_a.map_err(|source| PassError::Listing {
            side: Side::A,
            source,
        })?;
        let listed_b = listed_b.map_err(|source| PassError::Listing {
            side: Side::B,
            source,
        })?;

        let listings = Listings::new(listed_a, listed_b);
        let changes = build_change_set(&prior, &listings);

        info!(
            keys = changes.len(),
            prior_entries = prior.len(),
            "Pass started"
        );

        let mut snapshot = prior.clone();
        let mut report = SyncReport::default();
        let mut conflicts = Vec::new();

        for (key, (change_a, change_b)) in &changes {
            if cancel.is_cancelled() {
                info!(processed = report.total(), "Pass cancelled between keys");
                return Err(PassError::Cancelled);
            }

            let (outcome, update) = self
                .process_key(
                    task,
                    key,
                    *change_a,
                    *change_b,
                    &listings,
                    connector_a.as_ref(),
                    connector_b.as_ref(),
                    &overrides,
                    &blocked,
                    &mut conflicts,
                )
                .await?;

            match update {
                SnapUpdate::Keep => {}
                SnapUpdate::Set(entry) => snapshot.insert(key.clone(), entry),
                SnapUpdate::Remove => {
                    snapshot.remove(key);
                }
            }
            report.record(key.clone(), outcome);
        }

        self.snapshot_store.commit(&task.id, &snapshot).await?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            copied = report.copied,
            deleted = report.deleted,
            skipped = report.skipped,
            conflicts = report.conflicts,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Pass completed"
        );

        // The report is advisory; the snapshot is already committed, so
        // a failed save does not fail the pass.
        if let Err(e) = self.report_store.save(&task.id, &report).await {
            warn!(error = %e, "Failed to persist pass report");
        }

        Ok(PassOutcome {
            snapshot,
            conflicts,
            report,
        })
    }

    /// Decides and applies the action for one key.
    #[allow(clippy::too_many_arguments)]
    async fn process_key(
        &self,
        task: &SyncTask,
        key: &ItemKey,
        change_a: SideChange,
        change_b: SideChange,
        listings: &Listings,
        connector_a: &dyn IConnector,
        connector_b: &dyn IConnector,
        overrides: &BTreeMap<ItemKey, ConflictRecord>,
        blocked: &[ItemKey],
        conflicts: &mut Vec<ConflictRecord>,
    ) -> Result<(KeyOutcome, SnapUpdate), PassError> {
        let fp_a = listings.fingerprint(Side::A, key);
        let fp_b = listings.fingerprint(Side::B, key);
        let convergent = matches!((fp_a, fp_b), (Some(a), Some(b)) if a == b);

        // An operator decision takes precedence over re-deciding the key.
        if let Some(record) = overrides.get(key) {
            return self
                .apply_operator_resolution(
                    task,
                    key,
                    record,
                    change_a,
                    change_b,
                    listings,
                    connector_a,
                    connector_b,
                )
                .await;
        }

        if blocked.contains(key) {
            debug!(%key, "Skipping: awaiting manual conflict resolution");
            return Ok((KeyOutcome::Skipped, SnapUpdate::Keep));
        }

        let action = decide_action(change_a, change_b, convergent, task.direction);
        debug!(%key, a = %change_a, b = %change_b, %action, "Decided");

        match action {
            SyncAction::Skip => {
                // Convergent edits still move the snapshot base forward;
                // convergent deletes drop the entry.
                let update = match (change_a, change_b) {
                    (SideChange::Deleted, SideChange::Deleted) => SnapUpdate::Remove,
                    _ if convergent && (change_a.is_changed() || change_b.is_changed()) => {
                        match (fp_a, fp_b) {
                            (Some(a), Some(b)) => {
                                SnapUpdate::Set(SnapshotEntry::new(a.clone(), b.clone()))
                            }
                            _ => SnapUpdate::Keep,
                        }
                    }
                    _ => SnapUpdate::Keep,
                };
                Ok((KeyOutcome::Skipped, update))
            }
            SyncAction::CopyAToB => Ok(self
                .apply_copy(key, Side::A, listings, connector_a, connector_b)
                .await),
            SyncAction::CopyBToA => Ok(self
                .apply_copy(key, Side::B, listings, connector_b, connector_a)
                .await),
            SyncAction::DeleteA => Ok(self.apply_delete(key, Side::A, connector_a).await),
            SyncAction::DeleteB => Ok(self.apply_delete(key, Side::B, connector_b).await),
            SyncAction::Conflict => {
                self.handle_conflict(
                    task,
                    key,
                    change_a,
                    change_b,
                    listings,
                    connector_a,
                    connector_b,
                    conflicts,
                )
                .await
            }
        }
    }

    /// Copies `key` from `src_side` to the other side. The written-side
    /// fingerprint comes from the write result, never assumed.
    async fn apply_copy(
        &self,
        key: &ItemKey,
        src_side: Side,
        listings: &Listings,
        src: &dyn IConnector,
        dst: &dyn IConnector,
    ) -> (KeyOutcome, SnapUpdate) {
        let Some(src_fp) = listings.fingerprint(src_side, key).cloned() else {
            // Decision logic never emits a copy without a source listing.
            warn!(%key, side = %src_side, "Copy decided without source listing entry");
            return (KeyOutcome::Skipped, SnapUpdate::Keep);
        };

        match copy_item(src, dst, key, src_fp).await {
            Ok(CopyResult::Applied {
                src_fingerprint,
                dst_fingerprint,
            }) => {
                let entry = match src_side {
                    Side::A => SnapshotEntry::new(src_fingerprint, dst_fingerprint),
                    Side::B => SnapshotEntry::new(dst_fingerprint, src_fingerprint),
                };
                (KeyOutcome::Copied, SnapUpdate::Set(entry))
            }
            Ok(CopyResult::SourceVanished) => {
                debug!(%key, "Source vanished mid-pass; deferring to next pass");
                (KeyOutcome::Skipped, SnapUpdate::Keep)
            }
            Err(err) => {
                warn!(%key, error = %err, "Copy failed");
                (
                    KeyOutcome::Failed {
                        reason: err.to_string(),
                    },
                    SnapUpdate::Keep,
                )
            }
        }
    }

    /// Deletes `key` on the given side. An already-absent item counts as
    /// success (the sides converged on their own).
    async fn apply_delete(
        &self,
        key: &ItemKey,
        side: Side,
        connector: &dyn IConnector,
    ) -> (KeyOutcome, SnapUpdate) {
        match connector.delete(key).await {
            Ok(()) | Err(ConnectorError::ItemNotFound(_)) => {
                debug!(%key, %side, "Deleted");
                (KeyOutcome::Deleted, SnapUpdate::Remove)
            }
            Err(err) => {
                warn!(%key, %side, error = %err, "Delete failed");
                (
                    KeyOutcome::Failed {
                        reason: err.to_string(),
                    },
                    SnapUpdate::Keep,
                )
            }
        }
    }

    /// Runs the task's policy over a divergent key, records the conflict,
    /// and applies the resolution when one was reached.
    #[allow(clippy::too_many_arguments)]
    async fn handle_conflict(
        &self,
        task: &SyncTask,
        key: &ItemKey,
        change_a: SideChange,
        change_b: SideChange,
        listings: &Listings,
        connector_a: &dyn IConnector,
        connector_b: &dyn IConnector,
        conflicts: &mut Vec<ConflictRecord>,
    ) -> Result<(KeyOutcome, SnapUpdate), PassError> {
        let meta_a = listings.get(Side::A, key);
        let meta_b = listings.get(Side::B, key);
        let modified_a = meta_a.and_then(|m| m.modified_at);
        let modified_b = meta_b.and_then(|m| m.modified_at);

        let mut resolution =
            policy::evaluate(task.conflict_policy, modified_a, modified_b);

        // A resolution the task's direction cannot enact is deferred
        // instead of guessed around.
        if let Some(src_side) = resolution_source_side(resolution, change_a) {
            if !task.direction.allows_from(src_side) {
                debug!(
                    %key,
                    %resolution,
                    direction = %task.direction,
                    "Resolution propagates against task direction; deferring"
                );
                resolution = Resolution::ManualPending;
            }
        }

        let record = ConflictRecord::new(
            task.id.clone(),
            key.clone(),
            listings.fingerprint(Side::A, key).cloned(),
            listings.fingerprint(Side::B, key).cloned(),
        )
        .with_timestamps(modified_a, modified_b);

        info!(%key, %resolution, "Conflict detected");

        if resolution == Resolution::ManualPending {
            self.conflict_store
                .record(&record)
                .await
                .map_err(PassError::ConflictStore)?;
            conflicts.push(record);
            return Ok((KeyOutcome::Conflicted, SnapUpdate::Keep));
        }

        let (outcome, update, applied) = self
            .apply_resolution(
                key,
                resolution,
                change_a,
                change_b,
                listings,
                connector_a,
                connector_b,
            )
            .await;

        let mut record = record.resolve(resolution, ResolutionSource::Policy);
        if applied {
            record = record.mark_applied();
        }
        self.conflict_store
            .record(&record)
            .await
            .map_err(PassError::ConflictStore)?;
        conflicts.push(record);

        Ok((outcome, update))
    }

    /// Applies an operator's earlier decision to a key and marks the
    /// record applied on success.
    #[allow(clippy::too_many_arguments)]
    async fn apply_operator_resolution(
        &self,
        task: &SyncTask,
        key: &ItemKey,
        record: &ConflictRecord,
        change_a: SideChange,
        change_b: SideChange,
        listings: &Listings,
        connector_a: &dyn IConnector,
        connector_b: &dyn IConnector,
    ) -> Result<(KeyOutcome, SnapUpdate), PassError> {
        // The sides may have converged on their own while the decision
        // waited; nothing to enact then.
        let fp_a = listings.fingerprint(Side::A, key);
        let fp_b = listings.fingerprint(Side::B, key);
        if matches!((fp_a, fp_b), (Some(a), Some(b)) if a == b)
            || (fp_a.is_none() && fp_b.is_none())
        {
            debug!(%key, "Sides converged before operator resolution was applied");
            self.conflict_store
                .mark_applied(&record.id)
                .await
                .map_err(PassError::ConflictStore)?;
            let update = match (fp_a, fp_b) {
                (Some(a), Some(b)) => SnapUpdate::Set(SnapshotEntry::new(a.clone(), b.clone())),
                _ => SnapUpdate::Remove,
            };
            return Ok((KeyOutcome::Skipped, update));
        }

        // Same direction rule the policy path enforces: a decision that
        // would propagate against the task's direction is not enacted.
        // The record goes back to pending so the operator sees it again.
        if let Some(src_side) = resolution_source_side(record.resolution, change_a) {
            if !task.direction.allows_from(src_side) {
                warn!(
                    %key,
                    resolution = %record.resolution,
                    direction = %task.direction,
                    "Operator resolution propagates against task direction; reopening"
                );
                self.conflict_store
                    .reopen(&record.id)
                    .await
                    .map_err(PassError::ConflictStore)?;
                return Ok((KeyOutcome::Conflicted, SnapUpdate::Keep));
            }
        }

        info!(%key, resolution = %record.resolution, "Applying operator resolution");

        let (outcome, update, applied) = self
            .apply_resolution(
                key,
                record.resolution,
                change_a,
                change_b,
                listings,
                connector_a,
                connector_b,
            )
            .await;

        if applied {
            self.conflict_store
                .mark_applied(&record.id)
                .await
                .map_err(PassError::ConflictStore)?;
        }

        Ok((outcome, update))
    }

    /// Enacts a reached resolution. Returns the outcome, the snapshot
    /// update, and whether the resolution was fully applied.
    #[allow(clippy::too_many_arguments)]
    async fn apply_resolution(
        &self,
        key: &ItemKey,
        resolution: Resolution,
        change_a: SideChange,
        change_b: SideChange,
        listings: &Listings,
        connector_a: &dyn IConnector,
        connector_b: &dyn IConnector,
    ) -> (KeyOutcome, SnapUpdate, bool) {
        match resolution {
            Resolution::ManualPending => (KeyOutcome::Conflicted, SnapUpdate::Keep, false),

            Resolution::KeepA => {
                if change_a == SideChange::Deleted {
                    let (outcome, update) = self.apply_delete(key, Side::B, connector_b).await;
                    let applied = !matches!(outcome, KeyOutcome::Failed { .. });
                    (flag_conflicted(outcome), update, applied)
                } else {
                    let (outcome, update) = self
                        .apply_copy(key, Side::A, listings, connector_a, connector_b)
                        .await;
                    let applied = matches!(outcome, KeyOutcome::Copied);
                    (flag_conflicted(outcome), update, applied)
                }
            }

            Resolution::KeepB => {
                if change_b == SideChange::Deleted {
                    let (outcome, update) = self.apply_delete(key, Side::A, connector_a).await;
                    let applied = !matches!(outcome, KeyOutcome::Failed { .. });
                    (flag_conflicted(outcome), update, applied)
                } else {
                    let (outcome, update) = self
                        .apply_copy(key, Side::B, listings, connector_b, connector_a)
                        .await;
                    let applied = matches!(outcome, KeyOutcome::Copied);
                    (flag_conflicted(outcome), update, applied)
                }
            }

            Resolution::KeepBothRenamed => {
                // Winner is side A unless A's version is the deletion; the
                // loser's content is preserved under a conflict-copy key
                // on its own side before the winner overwrites it.
                let winner = if change_a == SideChange::Deleted {
                    Side::B
                } else {
                    Side::A
                };
                let loser = winner.other();
                let loser_connector = match loser {
                    Side::A => connector_a,
                    Side::B => connector_b,
                };

                if listings.get(loser, key).is_some() {
                    let renamed = conflict_copy_key(key);
                    match preserve_copy(loser_connector, key, &renamed).await {
                        Ok(()) => {
                            info!(%key, preserved_as = %renamed, "Preserved losing version");
                        }
                        Err(err) => {
                            warn!(%key, error = %err, "Failed to preserve losing version");
                            return (
                                KeyOutcome::Failed {
                                    reason: format!("keep-both preserve failed: {err}"),
                                },
                                SnapUpdate::Keep,
                                false,
                            );
                        }
                    }
                }

                let (src, dst) = match winner {
                    Side::A => (connector_a, connector_b),
                    Side::B => (connector_b, connector_a),
                };
                let (outcome, update) = self.apply_copy(key, winner, listings, src, dst).await;
                let applied = matches!(outcome, KeyOutcome::Copied);
                (flag_conflicted(outcome), update, applied)
            }
        }
    }
}

/// Conflict-sourced outcomes report as `Conflicted` rather than plain
/// copy/delete so the report's conflict counter reflects every divergence.
fn flag_conflicted(outcome: KeyOutcome) -> KeyOutcome {
    match outcome {
        KeyOutcome::Copied | KeyOutcome::Deleted | KeyOutcome::Skipped => KeyOutcome::Conflicted,
        failed @ KeyOutcome::Failed { .. } => failed,
        other => other,
    }
}

/// The side whose content a resolution would propagate, if any.
fn resolution_source_side(resolution: Resolution, change_a: SideChange) -> Option<Side> {
    match resolution {
        // A delete propagates the keeping side's state too.
        Resolution::KeepA => Some(Side::A),
        Resolution::KeepB => Some(Side::B),
        Resolution::KeepBothRenamed => Some(if change_a == SideChange::Deleted {
            Side::B
        } else {
            Side::A
        }),
        Resolution::ManualPending => None,
    }
}

/// Reads from `src` and writes to `dst`, returning observed fingerprints.
async fn copy_item(
    src: &dyn IConnector,
    dst: &dyn IConnector,
    key: &ItemKey,
    src_fingerprint: Fingerprint,
) -> Result<CopyResult, ConnectorError> {
    let payload = match src.read(key).await {
        Ok(payload) => payload,
        Err(ConnectorError::ItemNotFound(_)) => return Ok(CopyResult::SourceVanished),
        Err(err) => return Err(err),
    };
    let dst_fingerprint = dst.write(key, &payload).await?;
    Ok(CopyResult::Applied {
        src_fingerprint,
        dst_fingerprint,
    })
}

/// Duplicates `key`'s payload under `renamed` on the same connector.
async fn preserve_copy(
    connector: &dyn IConnector,
    key: &ItemKey,
    renamed: &ItemKey,
) -> Result<(), ConnectorError> {
    let payload = connector.read(key).await?;
    connector.write(renamed, &payload).await?;
    Ok(())
}
