//! Pass scheduler
//!
//! Fires synchronization passes for enabled tasks on their configured
//! intervals and on demand via [`Scheduler::run_now`]. Each pass executes
//! on its own tokio task, so one slow or failing task never holds up
//! another. Per-task run state enforces at-most-one pass per task at a
//! time: a tick or `run_now` that lands while the task is `Running` is
//! refused and logged, not queued.
//!
//! Lifecycle is owned by the caller: [`start`](Scheduler::start) spawns
//! the tickers, [`stop`](Scheduler::stop) waits for in-flight passes to
//! finish, [`shutdown_now`](Scheduler::shutdown_now) cancels them
//! cooperatively. An abandoned pass commits nothing.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument, warn};

use omnisync_connectors::connector_for;
use omnisync_core::domain::newtypes::TaskId;
use omnisync_core::domain::SyncReport;
use omnisync_engine::engine::SyncEngine;

use crate::manager::TaskManager;

/// Run state of one task as the scheduler sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No pass in flight
    Idle,
    /// A pass is executing right now
    Running,
    /// The last pass failed; the schedule keeps going
    Failed {
        /// Consecutive failures since the last clean pass
        attempts: u32,
    },
    /// The task was taken out of rotation (corrupt snapshot) and needs
    /// operator action before it runs again
    Disabled,
}

/// Interval-driven pass runner over the task registry.
pub struct Scheduler {
    manager: Arc<TaskManager>,
    engine: Arc<SyncEngine>,
    states: Arc<DashMap<TaskId, RunState>>,
    last_reports: Arc<DashMap<TaskId, SyncReport>>,
    /// Stops the tickers; in-flight passes are left to finish.
    ticker_stop: CancellationToken,
    /// Cancels in-flight passes cooperatively.
    pass_cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Scheduler {
    /// Creates a scheduler over the registry and engine. Nothing runs
    /// until [`start`](Scheduler::start).
    pub fn new(manager: Arc<TaskManager>, engine: Arc<SyncEngine>) -> Self {
        Self {
            manager,
            engine,
            states: Arc::new(DashMap::new()),
            last_reports: Arc::new(DashMap::new()),
            ticker_stop: CancellationToken::new(),
            pass_cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Spawns a ticker per enabled task. Tasks added to the registry
    /// afterwards are picked up by [`run_now`](Scheduler::run_now) or a
    /// restart, not by a live ticker.
    pub async fn start(&self) {
        let tasks = self.manager.list().await;
        let mut started = 0u32;
        for task in tasks {
            if !task.enabled {
                continue;
            }
            started += 1;
            let task_id = task.id.clone();
            let interval = Duration::from_secs(task.schedule.interval_secs);
            let stop = self.ticker_stop.clone();
            let scheduler = self.handle();
            self.tracker.spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                // The first tick fires immediately; skip it so start()
                // does not stampede every task at once.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        _ = ticker.tick() => {
                            scheduler.fire(&task_id).await;
                        }
                    }
                }
            });
        }
        info!(tickers = started, "Scheduler started");
    }

    /// Triggers a pass immediately, bypassing the timer. Returns whether
    /// the pass was accepted (refused while `Running` or `Disabled`).
    pub async fn run_now(&self, task_id: &TaskId) -> bool {
        self.handle().fire(task_id).await
    }

    /// The scheduler's view of a task's run state.
    #[must_use]
    pub fn state(&self, task_id: &TaskId) -> RunState {
        self.states
            .get(task_id)
            .map(|s| *s)
            .unwrap_or(RunState::Idle)
    }

    /// The report from the task's most recent completed pass.
    #[must_use]
    pub fn last_report(&self, task_id: &TaskId) -> Option<SyncReport> {
        self.last_reports.get(task_id).map(|r| r.clone())
    }

    /// Stops the tickers and waits for in-flight passes to finish.
    pub async fn stop(&self) {
        info!("Scheduler stopping, waiting for in-flight passes");
        self.ticker_stop.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Scheduler stopped");
    }

    /// Stops the tickers and cancels in-flight passes. Cancelled passes
    /// commit nothing; their tasks re-evaluate from the prior snapshot on
    /// the next run.
    pub async fn shutdown_now(&self) {
        info!("Scheduler shutting down now, cancelling in-flight passes");
        self.ticker_stop.cancel();
        self.pass_cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Scheduler shut down");
    }

    fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            manager: self.manager.clone(),
            engine: self.engine.clone(),
            states: self.states.clone(),
            last_reports: self.last_reports.clone(),
            pass_cancel: self.pass_cancel.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

/// The clonable innards a ticker or an in-flight pass needs.
#[derive(Clone)]
struct SchedulerHandle {
    manager: Arc<TaskManager>,
    engine: Arc<SyncEngine>,
    states: Arc<DashMap<TaskId, RunState>>,
    last_reports: Arc<DashMap<TaskId, SyncReport>>,
    pass_cancel: CancellationToken,
    tracker: TaskTracker,
}

impl SchedulerHandle {
    /// Attempts to start a pass for the task. Returns whether it was
    /// accepted.
    #[instrument(skip(self), fields(task = %task_id))]
    async fn fire(&self, task_id: &TaskId) -> bool {
        // Claim the Running slot atomically; a concurrent tick loses.
        let prior_attempts = {
            let mut state = self.states.entry(task_id.clone()).or_insert(RunState::Idle);
            match *state {
                RunState::Running => {
                    warn!("Pass already running, refusing to overlap");
                    return false;
                }
                RunState::Disabled => {
                    warn!("Task is disabled pending operator action, not firing");
                    return false;
                }
                RunState::Idle => {
                    *state = RunState::Running;
                    0
                }
                RunState::Failed { attempts } => {
                    *state = RunState::Running;
                    attempts
                }
            }
        };

        let restore = if prior_attempts == 0 {
            RunState::Idle
        } else {
            RunState::Failed {
                attempts: prior_attempts,
            }
        };
        let Some(task) = self.manager.get(task_id).await else {
            warn!("Task vanished from the registry, skipping");
            self.states.insert(task_id.clone(), restore);
            return false;
        };
        if !task.enabled {
            self.states.insert(task_id.clone(), restore);
            return false;
        }

        let handle = self.clone();
        let id = task_id.clone();
        self.tracker.spawn(async move {
            handle.execute(id, task, prior_attempts).await;
        });
        true
    }

    async fn execute(
        &self,
        task_id: TaskId,
        task: omnisync_core::domain::task::SyncTask,
        prior_attempts: u32,
    ) {
        let connectors = (
            connector_for(&task.side_a),
            connector_for(&task.side_b),
        );
        let (connector_a, connector_b) = match connectors {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                error!(task = %task_id, error = %e, "Connector resolution failed");
                self.states.insert(
                    task_id,
                    RunState::Failed {
                        attempts: prior_attempts + 1,
                    },
                );
                return;
            }
        };

        let cancel = self.pass_cancel.child_token();
        match self
            .engine
            .run_pass(&task, connector_a, connector_b, &cancel)
            .await
        {
            Ok(outcome) => {
                info!(
                    task = %task_id,
                    copied = outcome.report.copied,
                    deleted = outcome.report.deleted,
                    conflicts = outcome.report.conflicts,
                    failed = outcome.report.failed,
                    "Pass completed"
                );
                self.last_reports.insert(task_id.clone(), outcome.report);
                self.states.insert(task_id, RunState::Idle);
            }
            Err(e) if e.is_corrupt_snapshot() => {
                error!(task = %task_id, error = %e, "Snapshot is corrupt, disabling task");
                self.states.insert(task_id, RunState::Disabled);
            }
            Err(e) => {
                warn!(task = %task_id, error = %e, attempts = prior_attempts + 1, "Pass failed");
                self.states.insert(
                    task_id,
                    RunState::Failed {
                        attempts: prior_attempts + 1,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnisync_core::domain::newtypes::ItemKey;
    use omnisync_core::domain::task::{ConnectorRef, SyncTask};
    use omnisync_state::{JsonConflictStore, JsonReportStore, JsonSnapshotStore};

    async fn fixture(dir: &std::path::Path, task: SyncTask) -> (Arc<TaskManager>, Scheduler) {
        let manager = Arc::new(TaskManager::open(dir.join("tasks.json")).await.unwrap());
        manager.add(task).await.unwrap();
        let engine = Arc::new(SyncEngine::new(
            Arc::new(JsonSnapshotStore::new(dir)),
            Arc::new(JsonConflictStore::new(dir)),
            Arc::new(JsonReportStore::new(dir)),
        ));
        let scheduler = Scheduler::new(manager.clone(), engine);
        (manager, scheduler)
    }

    fn memory_task(id: &str) -> SyncTask {
        SyncTask::new(
            TaskId::new(id).unwrap(),
            ConnectorRef::new(format!("memory://{id}-a")).unwrap(),
            ConnectorRef::new(format!("memory://{id}-b")).unwrap(),
        )
    }

    async fn wait_until_settled(scheduler: &Scheduler, task_id: &TaskId) -> RunState {
        for _ in 0..200 {
            match scheduler.state(task_id) {
                RunState::Running => tokio::time::sleep(Duration::from_millis(10)).await,
                settled => return settled,
            }
        }
        scheduler.state(task_id)
    }

    #[tokio::test]
    async fn test_run_now_executes_a_pass() {
        let dir = tempfile::tempdir().unwrap();
        let task = memory_task("sched-run-now");
        let side_a = omnisync_connectors::memory::shared("sched-run-now-a");
        side_a.insert(ItemKey::new("a.txt").unwrap(), "payload");

        let (_manager, scheduler) = fixture(dir.path(), task).await;
        let id = TaskId::new("sched-run-now").unwrap();

        assert!(scheduler.run_now(&id).await);
        scheduler.stop().await;

        assert_eq!(scheduler.state(&id), RunState::Idle);
        let report = scheduler.last_report(&id).unwrap();
        assert_eq!(report.copied, 1);

        let side_b = omnisync_connectors::memory::shared("sched-run-now-b");
        assert!(side_b.contains(&ItemKey::new("a.txt").unwrap()));
    }

    #[tokio::test]
    async fn test_running_task_refuses_second_fire() {
        let dir = tempfile::tempdir().unwrap();
        let (_manager, scheduler) = fixture(dir.path(), memory_task("sched-overlap")).await;
        let id = TaskId::new("sched-overlap").unwrap();

        scheduler.states.insert(id.clone(), RunState::Running);
        assert!(!scheduler.run_now(&id).await);
    }

    #[tokio::test]
    async fn test_listing_failure_records_failed_state() {
        let dir = tempfile::tempdir().unwrap();
        let task = memory_task("sched-fail");
        omnisync_connectors::memory::shared("sched-fail-a").set_fail_listing(true);

        let (_manager, scheduler) = fixture(dir.path(), task).await;
        let id = TaskId::new("sched-fail").unwrap();

        assert!(scheduler.run_now(&id).await);
        scheduler.stop().await;

        assert_eq!(
            wait_until_settled(&scheduler, &id).await,
            RunState::Failed { attempts: 1 }
        );
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_disables_task() {
        let dir = tempfile::tempdir().unwrap();
        let task = memory_task("sched-corrupt");
        tokio::fs::write(
            dir.path().join("sched-corrupt.snapshot.json"),
            b"{not json",
        )
        .await
        .unwrap();

        let (_manager, scheduler) = fixture(dir.path(), task).await;
        let id = TaskId::new("sched-corrupt").unwrap();

        assert!(scheduler.run_now(&id).await);
        scheduler.stop().await;

        assert_eq!(scheduler.state(&id), RunState::Disabled);
        // Disabled tasks refuse further fires.
        assert!(!scheduler.run_now(&id).await);
    }

    #[tokio::test]
    async fn test_disabled_registry_task_does_not_fire() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, scheduler) = fixture(dir.path(), memory_task("sched-off")).await;
        let id = TaskId::new("sched-off").unwrap();

        manager.set_enabled(&id, false).await.unwrap();
        assert!(!scheduler.run_now(&id).await);
    }
}
