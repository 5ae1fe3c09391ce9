//! Omnisync CLI - command-line interface for the sync engine
//!
//! Provides commands for:
//! - Managing sync tasks
//! - Running passes on demand
//! - Inspecting and resolving conflicts
//! - Viewing per-task status
//! - Running the scheduler loop in the foreground

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;

use commands::{
    conflicts::ConflictsCommand, daemon::DaemonCommand, status::StatusCommand, sync::SyncCommand,
    task::TaskCommand,
};
use context::AppContext;
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "omnisync", version, about = "Two-sided file synchronization")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage sync tasks
    #[command(subcommand)]
    Task(TaskCommand),
    /// Run a synchronization pass now
    Sync(SyncCommand),
    /// Manage synchronization conflicts
    #[command(subcommand)]
    Conflicts(ConflictsCommand),
    /// Show per-task synchronization status
    Status(StatusCommand),
    /// Run the scheduler loop until Ctrl-C
    Daemon(DaemonCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = AppContext::open(cli.config.as_deref()).await?;
    init_tracing(&ctx, cli.verbose);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Task(cmd) => cmd.execute(&ctx, format).await,
        Commands::Sync(cmd) => cmd.execute(&ctx, format).await,
        Commands::Conflicts(cmd) => cmd.execute(&ctx, format).await,
        Commands::Status(cmd) => cmd.execute(&ctx, format).await,
        Commands::Daemon(cmd) => cmd.execute(&ctx, format).await,
    }
}

/// `-v` flags override the configured level; `RUST_LOG` overrides both.
fn init_tracing(ctx: &AppContext, verbose: u8) {
    let level = match verbose {
        0 => ctx.settings.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if ctx.settings.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
