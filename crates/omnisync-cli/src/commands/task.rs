//! Task commands - manage the sync task registry

use anyhow::{Context, Result};
use clap::Subcommand;

use omnisync_core::domain::newtypes::TaskId;
use omnisync_core::domain::task::{
    ConflictPolicy, ConnectorRef, FilterSet, SyncDirection, SyncTask, TaskSchedule,
};

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    /// Register a new sync task
    Add {
        /// Task id (alphanumeric plus `.`, `_`, `-`)
        id: TaskId,
        /// Side A connector URI, e.g. local:///home/user/docs
        side_a: ConnectorRef,
        /// Side B connector URI, e.g. local:///mnt/backup/docs
        side_b: ConnectorRef,
        /// Sync direction: bidirectional, a_to_b, b_to_a
        #[arg(long, default_value = "bidirectional")]
        direction: SyncDirection,
        /// Conflict policy: prefer_a, prefer_b, prefer_newer, manual
        #[arg(long, default_value = "manual")]
        policy: ConflictPolicy,
        /// Include glob (repeatable; empty means everything)
        #[arg(long = "include")]
        include: Vec<String>,
        /// Exclude glob (repeatable; exclusion wins)
        #[arg(long = "exclude")]
        exclude: Vec<String>,
        /// Seconds between scheduled passes
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
        /// Register the task without enabling it
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a task (snapshots and conflict records stay on disk)
    Remove {
        /// Task id
        id: TaskId,
    },
    /// List registered tasks
    List,
    /// Enable a task
    Enable {
        /// Task id
        id: TaskId,
    },
    /// Disable a task without removing it
    Disable {
        /// Task id
        id: TaskId,
    },
}

impl TaskCommand {
    pub async fn execute(self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        match self {
            TaskCommand::Add {
                id,
                side_a,
                side_b,
                direction,
                policy,
                include,
                exclude,
                interval_secs,
                disabled,
            } => {
                let mut task = SyncTask::new(id.clone(), side_a, side_b);
                task.direction = direction;
                task.conflict_policy = policy;
                task.filters = FilterSet::new(include, exclude).context("Invalid filter glob")?;
                task.schedule =
                    TaskSchedule::every_secs(interval_secs).context("Invalid schedule")?;
                task.enabled = !disabled;

                ctx.manager.add(task).await?;
                formatter.success(&format!("Task '{id}' registered"));
                Ok(())
            }
            TaskCommand::Remove { id } => {
                ctx.manager.remove(&id).await?;
                formatter.success(&format!("Task '{id}' removed"));
                Ok(())
            }
            TaskCommand::List => {
                let tasks = ctx.manager.list().await;
                if format == OutputFormat::Json {
                    let value = serde_json::to_value(&tasks)?;
                    formatter.print_json(&serde_json::json!({
                        "count": tasks.len(),
                        "tasks": value,
                    }));
                } else if tasks.is_empty() {
                    formatter.info("No tasks registered");
                } else {
                    for task in &tasks {
                        let state = if task.enabled { "enabled" } else { "disabled" };
                        formatter.info(&format!(
                            "{}  {} <-> {}  [{} / {} / every {}s / {}]",
                            task.id,
                            task.side_a,
                            task.side_b,
                            task.direction,
                            task.conflict_policy,
                            task.schedule.interval_secs,
                            state
                        ));
                    }
                }
                Ok(())
            }
            TaskCommand::Enable { id } => {
                ctx.manager.set_enabled(&id, true).await?;
                formatter.success(&format!("Task '{id}' enabled"));
                Ok(())
            }
            TaskCommand::Disable { id } => {
                ctx.manager.set_enabled(&id, false).await?;
                formatter.success(&format!("Task '{id}' disabled"));
                Ok(())
            }
        }
    }
}
