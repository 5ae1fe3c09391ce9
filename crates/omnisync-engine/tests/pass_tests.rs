//! End-to-end pass tests over in-memory connectors and JSON stores.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

use omnisync_connectors::memory::{Fault, InMemoryConnector};
use omnisync_core::domain::conflict::{Resolution, ResolutionSource};
use omnisync_core::domain::newtypes::{ItemKey, TaskId};
use omnisync_core::domain::task::{ConflictPolicy, ConnectorRef, SyncDirection, SyncTask};
use omnisync_core::domain::KeyOutcome;
use omnisync_core::ports::conflict_store::IConflictStore;
use omnisync_core::ports::connector::IConnector;
use omnisync_core::ports::report_store::IReportStore;
use omnisync_core::ports::snapshot_store::ISnapshotStore;
use omnisync_engine::engine::{PassOutcome, SyncEngine};
use omnisync_engine::PassError;
use omnisync_state::{JsonConflictStore, JsonReportStore, JsonSnapshotStore};

fn key(s: &str) -> ItemKey {
    ItemKey::new(s).unwrap()
}

struct Harness {
    _dir: tempfile::TempDir,
    engine: SyncEngine,
    snapshot_store: Arc<JsonSnapshotStore>,
    conflict_store: Arc<JsonConflictStore>,
    report_store: Arc<JsonReportStore>,
    side_a: Arc<InMemoryConnector>,
    side_b: Arc<InMemoryConnector>,
    task: SyncTask,
}

impl Harness {
    fn new(task_id: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let snapshot_store = Arc::new(JsonSnapshotStore::new(dir.path()));
        let conflict_store = Arc::new(JsonConflictStore::new(dir.path()));
        let report_store = Arc::new(JsonReportStore::new(dir.path()));
        let engine = SyncEngine::new(
            snapshot_store.clone(),
            conflict_store.clone(),
            report_store.clone(),
        );
        let task = SyncTask::new(
            TaskId::new(task_id).unwrap(),
            ConnectorRef::new("memory://side-a").unwrap(),
            ConnectorRef::new("memory://side-b").unwrap(),
        );
        Self {
            _dir: dir,
            engine,
            snapshot_store,
            conflict_store,
            report_store,
            side_a: Arc::new(InMemoryConnector::new()),
            side_b: Arc::new(InMemoryConnector::new()),
            task,
        }
    }

    async fn run(&self) -> PassOutcome {
        self.try_run(&CancellationToken::new()).await.unwrap()
    }

    async fn try_run(&self, cancel: &CancellationToken) -> Result<PassOutcome, PassError> {
        self.engine
            .run_pass(
                &self.task,
                self.side_a.clone() as Arc<dyn IConnector>,
                self.side_b.clone() as Arc<dyn IConnector>,
                cancel,
            )
            .await
    }
}

#[tokio::test]
async fn test_new_item_copies_a_to_b() {
    let h = Harness::new("scenario-a");
    h.side_a.insert(key("f1"), "payload-one");

    let outcome = h.run().await;

    assert_eq!(outcome.report.copied, 1);
    assert_eq!(h.side_b.payload(&key("f1")).unwrap(), b"payload-one");
    let entry = outcome.snapshot.get(&key("f1")).unwrap();
    assert_eq!(entry.fingerprint_a, entry.fingerprint_b);
}

#[tokio::test]
async fn test_single_side_edit_propagates() {
    let h = Harness::new("scenario-b");
    h.side_a.insert(key("f1"), "version-one");
    h.run().await;

    let new_fp = h.side_a.insert(key("f1"), "version-two");
    let outcome = h.run().await;

    assert_eq!(outcome.report.copied, 1);
    assert_eq!(h.side_b.payload(&key("f1")).unwrap(), b"version-two");
    let entry = outcome.snapshot.get(&key("f1")).unwrap();
    assert_eq!(entry.fingerprint_a, new_fp);
    assert_eq!(entry.fingerprint_b, new_fp);
}

#[tokio::test]
async fn test_divergent_edit_prefer_a_wins_and_records() {
    let mut h = Harness::new("scenario-c");
    h.task.conflict_policy = ConflictPolicy::PreferA;
    h.side_a.insert(key("f1"), "base");
    h.run().await;

    h.side_a.insert(key("f1"), "from-a");
    h.side_b.insert(key("f1"), "from-b");
    let outcome = h.run().await;

    assert_eq!(outcome.report.conflicts, 1);
    assert_eq!(h.side_b.payload(&key("f1")).unwrap(), b"from-a");
    let entry = outcome.snapshot.get(&key("f1")).unwrap();
    assert_eq!(entry.fingerprint_a, entry.fingerprint_b);

    // The record exists even though the policy auto-resolved.
    assert_eq!(outcome.conflicts.len(), 1);
    let record = &outcome.conflicts[0];
    assert_eq!(record.resolution, Resolution::KeepA);
    assert_eq!(record.resolved_by, Some(ResolutionSource::Policy));
    assert!(record.applied_at.is_some());
}

#[tokio::test]
async fn test_deletion_propagates_and_drops_entry() {
    let h = Harness::new("scenario-d");
    h.side_a.insert(key("f1"), "doomed");
    h.run().await;

    h.side_a.delete(&key("f1")).await.unwrap();
    let outcome = h.run().await;

    assert_eq!(outcome.report.deleted, 1);
    assert!(!h.side_b.contains(&key("f1")));
    assert!(outcome.snapshot.get(&key("f1")).is_none());
}

#[tokio::test]
async fn test_second_pass_is_all_skips() {
    let h = Harness::new("idempotence");
    h.side_a.insert(key("f1"), "one");
    h.side_a.insert(key("dir/f2"), "two");
    h.side_b.insert(key("f3"), "three");
    let first = h.run().await;
    assert_eq!(first.report.copied, 3);

    let second = h.run().await;
    assert_eq!(second.report.copied, 0);
    assert_eq!(second.report.deleted, 0);
    assert_eq!(second.report.conflicts, 0);
    assert_eq!(second.report.failed, 0);
    assert!(second
        .report
        .outcomes
        .values()
        .all(|o| *o == KeyOutcome::Skipped));
    assert_eq!(second.snapshot, first.snapshot);
}

#[tokio::test]
async fn test_convergent_edits_advance_snapshot_without_copying() {
    let h = Harness::new("convergent");
    h.side_a.insert(key("f1"), "base");
    let first = h.run().await;
    let old_entry = first.snapshot.get(&key("f1")).unwrap().clone();

    // Both sides end up with identical new content on their own.
    let fp = h.side_a.insert(key("f1"), "same-new");
    h.side_b.insert(key("f1"), "same-new");
    let outcome = h.run().await;

    assert_eq!(outcome.report.copied, 0);
    let entry = outcome.snapshot.get(&key("f1")).unwrap();
    assert_eq!(entry.fingerprint_a, fp);
    assert_eq!(entry.fingerprint_b, fp);
    assert_ne!(entry.fingerprint_a, old_entry.fingerprint_a);
}

#[tokio::test]
async fn test_manual_policy_defers_and_blocks_the_key() {
    let h = Harness::new("manual-block");
    h.side_a.insert(key("f1"), "base");
    let first = h.run().await;
    let base_entry = first.snapshot.get(&key("f1")).unwrap().clone();

    h.side_a.insert(key("f1"), "from-a");
    h.side_b.insert(key("f1"), "from-b");
    let outcome = h.run().await;

    // No silent loss: nothing moved, but a record exists.
    assert_eq!(outcome.report.conflicts, 1);
    assert_eq!(h.side_a.payload(&key("f1")).unwrap(), b"from-a");
    assert_eq!(h.side_b.payload(&key("f1")).unwrap(), b"from-b");
    assert_eq!(outcome.snapshot.get(&key("f1")).unwrap(), &base_entry);

    let pending = h.conflict_store.pending(&h.task.id).await.unwrap();
    assert_eq!(pending.len(), 1);

    // The blocked key is skipped on later passes, not re-reported.
    let again = h.run().await;
    assert_eq!(again.report.conflicts, 0);
    assert_eq!(
        again.report.outcomes.get(&key("f1")),
        Some(&KeyOutcome::Skipped)
    );
    assert_eq!(h.conflict_store.pending(&h.task.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_operator_resolution_enacted_on_next_pass() {
    let h = Harness::new("operator-resolve");
    h.side_a.insert(key("f1"), "base");
    h.run().await;
    h.side_a.insert(key("f1"), "from-a");
    h.side_b.insert(key("f1"), "from-b");
    h.run().await;

    let pending = h.conflict_store.pending(&h.task.id).await.unwrap();
    h.conflict_store
        .resolve(&pending[0].id, Resolution::KeepB)
        .await
        .unwrap();

    let outcome = h.run().await;
    assert_eq!(h.side_a.payload(&key("f1")).unwrap(), b"from-b");
    let entry = outcome.snapshot.get(&key("f1")).unwrap();
    assert_eq!(entry.fingerprint_a, entry.fingerprint_b);

    let record = h.conflict_store.get(&pending[0].id).await.unwrap().unwrap();
    assert!(record.applied_at.is_some());
    assert!(h.conflict_store.unapplied(&h.task.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_operator_resolution_against_direction_is_reopened() {
    let mut h = Harness::new("operator-against-direction");
    h.task.direction = SyncDirection::AToB;
    h.side_a.insert(key("f1"), "base");
    h.run().await;
    h.side_a.insert(key("f1"), "from-a");
    h.side_b.insert(key("f1"), "from-b");
    h.run().await;

    // keep_b would propagate B -> A, against the task direction.
    let pending = h.conflict_store.pending(&h.task.id).await.unwrap();
    h.conflict_store
        .resolve(&pending[0].id, Resolution::KeepB)
        .await
        .unwrap();

    let outcome = h.run().await;

    // Nothing moved, and the decision was not applied.
    assert_eq!(outcome.report.conflicts, 1);
    assert_eq!(h.side_a.payload(&key("f1")).unwrap(), b"from-a");
    assert_eq!(h.side_b.payload(&key("f1")).unwrap(), b"from-b");

    // The record is back in the pending queue for the operator.
    let record = h.conflict_store.get(&pending[0].id).await.unwrap().unwrap();
    assert_eq!(record.resolution, Resolution::ManualPending);
    assert!(record.applied_at.is_none());
    assert!(h.conflict_store.unapplied(&h.task.id).await.unwrap().is_empty());
    assert_eq!(h.conflict_store.pending(&h.task.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_keep_both_renamed_preserves_the_loser() {
    let h = Harness::new("keep-both");
    h.side_a.insert(key("notes.txt"), "base");
    h.run().await;
    h.side_a.insert(key("notes.txt"), "from-a");
    h.side_b.insert(key("notes.txt"), "from-b");
    h.run().await;

    let pending = h.conflict_store.pending(&h.task.id).await.unwrap();
    h.conflict_store
        .resolve(&pending[0].id, Resolution::KeepBothRenamed)
        .await
        .unwrap();
    h.run().await;

    // Winner (side A, the non-deleted changer) lands on both sides.
    assert_eq!(h.side_b.payload(&key("notes.txt")).unwrap(), b"from-a");

    // The losing version survives under a conflict-copy name on its side.
    let preserved: Vec<ItemKey> = h
        .side_b
        .keys()
        .into_iter()
        .filter(|k| k.as_str().contains("(conflicted copy"))
        .collect();
    assert_eq!(preserved.len(), 1);
    assert!(preserved[0].as_str().starts_with("notes (conflicted copy"));
    assert!(preserved[0].as_str().ends_with(".txt"));
    assert_eq!(h.side_b.payload(&preserved[0]).unwrap(), b"from-b");
}

#[tokio::test]
async fn test_keep_both_interrupted_before_overwrite_loses_nothing() {
    let h = Harness::new("keep-both-interrupted");
    h.side_a.insert(key("notes.txt"), "base");
    let first = h.run().await;
    let base_entry = first.snapshot.get(&key("notes.txt")).unwrap().clone();

    h.side_a.insert(key("notes.txt"), "from-a");
    h.side_b.insert(key("notes.txt"), "from-b");
    h.run().await;

    let pending = h.conflict_store.pending(&h.task.id).await.unwrap();
    h.conflict_store
        .resolve(&pending[0].id, Resolution::KeepBothRenamed)
        .await
        .unwrap();

    // The loser is preserved on side B from B's own content, so faulting
    // the winner's source on A lands between the preserve write and the
    // overwrite: the renamed copy exists, the overwrite never happens.
    h.side_a.fail_key(key("notes.txt"), Fault::Unavailable);
    let outcome = h.run().await;

    assert_eq!(outcome.report.failed, 1);
    let preserved: Vec<ItemKey> = h
        .side_b
        .keys()
        .into_iter()
        .filter(|k| k.as_str().contains("(conflicted copy"))
        .collect();
    assert_eq!(preserved.len(), 1);
    assert_eq!(h.side_b.payload(&preserved[0]).unwrap(), b"from-b");

    // Neither version was lost and the decision is still outstanding.
    assert_eq!(h.side_a.payload(&key("notes.txt")).unwrap(), b"from-a");
    assert_eq!(h.side_b.payload(&key("notes.txt")).unwrap(), b"from-b");
    assert_eq!(outcome.snapshot.get(&key("notes.txt")).unwrap(), &base_entry);
    let record = h.conflict_store.get(&pending[0].id).await.unwrap().unwrap();
    assert!(record.applied_at.is_none());
    assert_eq!(h.conflict_store.unapplied(&h.task.id).await.unwrap().len(), 1);

    // Once the fault clears the resolution completes; every preserved
    // copy still carries the losing content.
    h.side_a.clear_fault(&key("notes.txt"));
    h.run().await;

    assert_eq!(h.side_b.payload(&key("notes.txt")).unwrap(), b"from-a");
    let record = h.conflict_store.get(&pending[0].id).await.unwrap().unwrap();
    assert!(record.applied_at.is_some());
    for k in h.side_b.keys() {
        if k.as_str().contains("(conflicted copy") {
            assert_eq!(h.side_b.payload(&k).unwrap(), b"from-b");
        }
    }
}

#[tokio::test]
async fn test_prefer_newer_picks_the_later_timestamp() {
    let mut h = Harness::new("prefer-newer");
    h.task.conflict_policy = ConflictPolicy::PreferNewer;
    h.side_a.insert(key("f1"), "base");
    h.run().await;

    let t = Utc::now();
    h.side_a.insert_at(key("f1"), "older", t - Duration::minutes(5));
    h.side_b.insert_at(key("f1"), "newer", t);
    let outcome = h.run().await;

    assert_eq!(outcome.report.conflicts, 1);
    assert_eq!(h.side_a.payload(&key("f1")).unwrap(), b"newer");
    assert_eq!(outcome.conflicts[0].resolution, Resolution::KeepB);
}

#[tokio::test]
async fn test_prefer_newer_tie_defers_to_manual() {
    let mut h = Harness::new("prefer-newer-tie");
    h.task.conflict_policy = ConflictPolicy::PreferNewer;
    h.side_a.insert(key("f1"), "base");
    h.run().await;

    let t = Utc::now();
    h.side_a.insert_at(key("f1"), "from-a", t);
    h.side_b.insert_at(key("f1"), "from-b", t);
    h.run().await;

    // Neither side moved; the conflict waits for the operator.
    assert_eq!(h.side_a.payload(&key("f1")).unwrap(), b"from-a");
    assert_eq!(h.side_b.payload(&key("f1")).unwrap(), b"from-b");
    let pending = h.conflict_store.pending(&h.task.id).await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_permission_denied_does_not_block_other_keys() {
    let h = Harness::new("failure-isolation");
    h.side_a.insert(key("good.txt"), "fine");
    h.side_a.insert(key("bad.txt"), "blocked");
    h.side_b.fail_key(key("bad.txt"), Fault::PermissionDenied);

    let outcome = h.run().await;

    assert_eq!(outcome.report.copied, 1);
    assert_eq!(outcome.report.failed, 1);
    assert_eq!(h.side_b.payload(&key("good.txt")).unwrap(), b"fine");
    assert!(outcome.snapshot.get(&key("good.txt")).is_some());
    // The failed key has no entry yet, so it is re-classified as created
    // next pass.
    assert!(outcome.snapshot.get(&key("bad.txt")).is_none());

    h.side_b.clear_fault(&key("bad.txt"));
    let retry = h.run().await;
    assert_eq!(retry.report.copied, 1);
    assert_eq!(h.side_b.payload(&key("bad.txt")).unwrap(), b"blocked");
}

#[tokio::test]
async fn test_listing_failure_aborts_without_commit() {
    let h = Harness::new("listing-abort");
    h.side_a.insert(key("f1"), "payload");
    h.side_b.set_fail_listing(true);

    let err = h.try_run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(
        err,
        PassError::Listing {
            side: omnisync_core::domain::task::Side::B,
            ..
        }
    ));

    let persisted = h.snapshot_store.load(&h.task.id).await.unwrap();
    assert!(persisted.is_empty());
}

#[tokio::test]
async fn test_cancelled_pass_commits_nothing() {
    let h = Harness::new("cancel");
    h.side_a.insert(key("f1"), "payload");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = h.try_run(&cancel).await.unwrap_err();
    assert!(matches!(err, PassError::Cancelled));

    let persisted = h.snapshot_store.load(&h.task.id).await.unwrap();
    assert!(persisted.is_empty());
    assert!(!h.side_b.contains(&key("f1")));
}

#[tokio::test]
async fn test_one_way_suppresses_reverse_changes() {
    let mut h = Harness::new("one-way-skip");
    h.task.direction = SyncDirection::AToB;
    h.side_a.insert(key("f1"), "forward");
    h.run().await;

    h.side_b.insert(key("f1"), "reverse-edit");
    let outcome = h.run().await;

    assert_eq!(
        outcome.report.outcomes.get(&key("f1")),
        Some(&KeyOutcome::Skipped)
    );
    assert_eq!(h.side_a.payload(&key("f1")).unwrap(), b"forward");
    assert_eq!(h.side_b.payload(&key("f1")).unwrap(), b"reverse-edit");
}

#[tokio::test]
async fn test_one_way_divergence_still_flags_conflict() {
    let mut h = Harness::new("one-way-conflict");
    h.task.direction = SyncDirection::AToB;
    h.task.conflict_policy = ConflictPolicy::PreferB;
    h.side_a.insert(key("f1"), "base");
    h.run().await;

    h.side_a.insert(key("f1"), "from-a");
    h.side_b.insert(key("f1"), "from-b");
    let outcome = h.run().await;

    // PreferB would have to propagate B -> A against the direction, so
    // the conflict is deferred to the operator rather than enacted.
    assert_eq!(outcome.report.conflicts, 1);
    assert_eq!(h.side_a.payload(&key("f1")).unwrap(), b"from-a");
    assert_eq!(h.side_b.payload(&key("f1")).unwrap(), b"from-b");
    let pending = h.conflict_store.pending(&h.task.id).await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_pass_persists_its_report() {
    let h = Harness::new("report-persist");
    h.side_a.insert(key("f1"), "one");
    h.side_b.insert(key("f2"), "two");

    let outcome = h.run().await;

    let saved = h.report_store.load(&h.task.id).await.unwrap().unwrap();
    assert_eq!(saved.copied, outcome.report.copied);
    assert_eq!(saved.failed, outcome.report.failed);
    assert_eq!(saved.outcomes, outcome.report.outcomes);

    // The next pass replaces the record with its own numbers.
    h.run().await;
    let saved = h.report_store.load(&h.task.id).await.unwrap().unwrap();
    assert_eq!(saved.copied, 0);
    assert_eq!(saved.skipped, 2);
}

#[tokio::test]
async fn test_filters_scope_the_pass() {
    let mut h = Harness::new("filters");
    h.task.filters =
        omnisync_core::domain::task::FilterSet::new(vec![], vec!["*.tmp".into()]).unwrap();
    h.side_a.insert(key("keep.md"), "m");
    h.side_a.insert(key("scratch.tmp"), "t");

    let outcome = h.run().await;

    assert_eq!(outcome.report.copied, 1);
    assert!(h.side_b.contains(&key("keep.md")));
    assert!(!h.side_b.contains(&key("scratch.tmp")));
    assert!(outcome.snapshot.get(&key("scratch.tmp")).is_none());
}
