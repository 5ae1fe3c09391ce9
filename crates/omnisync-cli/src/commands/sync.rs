//! Sync command - run a pass now

use anyhow::{bail, Result};
use clap::Args;

use omnisync_core::domain::newtypes::TaskId;
use omnisync_sched::{RunState, Scheduler};

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Task to run
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    task: Option<TaskId>,

    /// Run every enabled task
    #[arg(long)]
    all: bool,
}

impl SyncCommand {
    pub async fn execute(self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let targets: Vec<TaskId> = if self.all {
            ctx.manager
                .list()
                .await
                .into_iter()
                .filter(|t| t.enabled)
                .map(|t| t.id)
                .collect()
        } else {
            match self.task {
                Some(id) => vec![id],
                None => bail!("No task given; use a task id or --all"),
            }
        };
        if targets.is_empty() {
            formatter.info("No enabled tasks to run");
            return Ok(());
        }

        let scheduler = Scheduler::new(ctx.manager.clone(), ctx.engine.clone());
        let mut refused = Vec::new();
        for id in &targets {
            if !scheduler.run_now(id).await {
                refused.push(id.clone());
            }
        }
        // Waits for every accepted pass.
        scheduler.stop().await;

        let mut failures = Vec::new();
        for id in &targets {
            if refused.contains(id) {
                formatter.warn(&format!("{id}: not runnable (disabled or unknown)"));
                failures.push(id.clone());
                continue;
            }
            match scheduler.state(id) {
                RunState::Failed { .. } | RunState::Disabled => {
                    formatter.error(&format!("{id}: pass failed"));
                    failures.push(id.clone());
                }
                _ => {
                    if let Some(report) = scheduler.last_report(id) {
                        formatter.report(id.as_str(), &report);
                    }
                }
            }
        }

        if !failures.is_empty() {
            bail!(
                "{} of {} task(s) did not complete cleanly",
                failures.len(),
                targets.len()
            );
        }
        Ok(())
    }
}
