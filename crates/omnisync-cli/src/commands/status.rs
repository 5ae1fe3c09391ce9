//! Status command - per-task synchronization state

use anyhow::{Context, Result};
use clap::Args;

use omnisync_core::domain::SyncReport;
use omnisync_core::ports::conflict_store::IConflictStore;
use omnisync_core::ports::report_store::IReportStore;
use omnisync_core::ports::snapshot_store::ISnapshotStore;

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand;

impl StatusCommand {
    pub async fn execute(self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let tasks = ctx.manager.list().await;

        let mut rows = Vec::new();
        for task in &tasks {
            // A corrupt snapshot is part of the status, not a reason to
            // abort the whole report.
            let (entries, snapshot_note) = match ctx.snapshot_store.load(&task.id).await {
                Ok(snapshot) => {
                    let last = snapshot
                        .iter()
                        .map(|(_, e)| e.last_synced)
                        .max()
                        .map(|at| at.to_rfc3339());
                    (Some((snapshot.len(), last)), None)
                }
                Err(e) => (None, Some(e.to_string())),
            };
            let pending = ctx
                .conflict_store
                .pending(&task.id)
                .await
                .with_context(|| format!("Failed to read conflicts for '{}'", task.id))?
                .len();
            // An unreadable report degrades to "no report", same as a
            // task that has never run.
            let last_report: Option<SyncReport> =
                ctx.report_store.load(&task.id).await.unwrap_or(None);
            rows.push((task, entries, snapshot_note, pending, last_report));
        }

        if format == OutputFormat::Json {
            let tasks_json: Vec<serde_json::Value> = rows
                .iter()
                .map(|(task, entries, note, pending, last_report)| {
                    serde_json::json!({
                        "id": task.id.to_string(),
                        "enabled": task.enabled,
                        "direction": task.direction.to_string(),
                        "conflict_policy": task.conflict_policy.to_string(),
                        "snapshot_entries": entries.as_ref().map(|(n, _)| n),
                        "last_synced": entries.as_ref().and_then(|(_, at)| at.clone()),
                        "snapshot_error": note,
                        "pending_conflicts": pending,
                        "last_report": last_report,
                    })
                })
                .collect();
            formatter.print_json(&serde_json::json!({
                "count": rows.len(),
                "tasks": tasks_json,
            }));
            return Ok(());
        }

        if rows.is_empty() {
            formatter.info("No tasks registered");
            return Ok(());
        }
        for (task, entries, note, pending, last_report) in rows {
            let state = if task.enabled { "enabled" } else { "disabled" };
            match (entries, note) {
                (Some((count, last)), _) => formatter.info(&format!(
                    "{}  [{}]  {} item(s) in snapshot, {} pending conflict(s), last synced {}",
                    task.id,
                    state,
                    count,
                    pending,
                    last.unwrap_or_else(|| "never".into())
                )),
                (None, Some(reason)) => {
                    formatter.warn(&format!("{}  [{}]  snapshot unreadable: {}", task.id, state, reason))
                }
                (None, None) => {}
            }
            if let Some(report) = last_report {
                formatter.info(&format!(
                    "    last pass: {} copied, {} deleted, {} skipped, {} conflict(s), {} failed in {} ms",
                    report.copied,
                    report.deleted,
                    report.skipped,
                    report.conflicts,
                    report.failed,
                    report.duration_ms
                ));
            }
        }
        Ok(())
    }
}
