//! Daemon command - run the scheduler loop in the foreground

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::{info, warn};

use omnisync_sched::Scheduler;

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Args)]
pub struct DaemonCommand;

impl DaemonCommand {
    pub async fn execute(self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let scheduler = Scheduler::new(ctx.manager.clone(), ctx.engine.clone());

        scheduler.start().await;
        formatter.success("Scheduler running; press Ctrl-C to stop");

        tokio::signal::ctrl_c().await?;
        info!("Ctrl-C received, stopping scheduler");

        let grace = Duration::from_secs(ctx.settings.scheduler.shutdown_grace_secs);
        if tokio::time::timeout(grace, scheduler.stop()).await.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "Grace period expired, cancelling in-flight passes"
            );
            scheduler.shutdown_now().await;
        }

        formatter.success("Scheduler stopped");
        Ok(())
    }
}
