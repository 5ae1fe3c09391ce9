//! Conflicts commands - inspect and resolve recorded conflicts
//!
//! `resolve` stores the operator's decision; the actual copy or delete
//! happens at the start of the task's next pass, when both sides can be
//! re-checked. `sync <task>` right after resolving enacts it immediately.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use uuid::Uuid;

use omnisync_core::domain::conflict::{ConflictRecord, Resolution};
use omnisync_core::ports::conflict_store::IConflictStore;

use crate::context::AppContext;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum ConflictsCommand {
    /// List pending conflicts across every task
    List,
    /// Record a resolution for a conflict
    Resolve {
        /// Conflict id (from `conflicts list`)
        id: Uuid,
        /// Resolution: keep_a, keep_b, keep_both_renamed
        resolution: Resolution,
    },
    /// Show one conflict in full
    Show {
        /// Conflict id
        id: Uuid,
    },
}

impl ConflictsCommand {
    pub async fn execute(self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        match self {
            ConflictsCommand::List => {
                let mut pending = Vec::new();
                for task in ctx.manager.list().await {
                    pending.extend(
                        ctx.conflict_store
                            .pending(&task.id)
                            .await
                            .with_context(|| format!("Failed to read conflicts for '{}'", task.id))?,
                    );
                }

                if format == OutputFormat::Json {
                    formatter.print_json(&serde_json::json!({
                        "count": pending.len(),
                        "conflicts": serde_json::to_value(&pending)?,
                    }));
                } else if pending.is_empty() {
                    formatter.success("No pending conflicts");
                } else {
                    for record in &pending {
                        formatter.info(&format!(
                            "{}  {}  {}  detected {}",
                            record.id,
                            record.task_id,
                            record.key,
                            record.detected_at.to_rfc3339()
                        ));
                    }
                }
                Ok(())
            }
            ConflictsCommand::Resolve { id, resolution } => {
                if resolution == Resolution::ManualPending {
                    bail!("'manual_pending' is the unresolved state, not a resolution");
                }
                match ctx.conflict_store.resolve(&id, resolution).await? {
                    Some(record) => {
                        formatter.success(&format!(
                            "Conflict {} on '{}' resolved as {}; applied on the task's next pass",
                            record.id, record.key, resolution
                        ));
                        Ok(())
                    }
                    None => bail!("No conflict with id {id}"),
                }
            }
            ConflictsCommand::Show { id } => {
                match ctx.conflict_store.get(&id).await? {
                    Some(record) => {
                        show_record(&*formatter, format, &record)?;
                        Ok(())
                    }
                    None => bail!("No conflict with id {id}"),
                }
            }
        }
    }
}

fn show_record(
    formatter: &dyn OutputFormatter,
    format: OutputFormat,
    record: &ConflictRecord,
) -> Result<()> {
    if format == OutputFormat::Json {
        formatter.print_json(&serde_json::to_value(record)?);
        return Ok(());
    }
    formatter.info(&format!("id:          {}", record.id));
    formatter.info(&format!("task:        {}", record.task_id));
    formatter.info(&format!("key:         {}", record.key));
    formatter.info(&format!("detected:    {}", record.detected_at.to_rfc3339()));
    formatter.info(&format!("resolution:  {}", record.resolution));
    if let Some(fp) = &record.fingerprint_a {
        formatter.info(&format!("side A:      {fp}"));
    } else {
        formatter.info("side A:      (deleted)");
    }
    if let Some(fp) = &record.fingerprint_b {
        formatter.info(&format!("side B:      {fp}"));
    } else {
        formatter.info("side B:      (deleted)");
    }
    if let Some(at) = record.resolved_at {
        formatter.info(&format!("resolved:    {}", at.to_rfc3339()));
    }
    if let Some(at) = record.applied_at {
        formatter.info(&format!("applied:     {}", at.to_rfc3339()));
    }
    Ok(())
}
