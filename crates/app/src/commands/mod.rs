//! Operator commands
//!
//! Each command runs against an [`AppContext`] and returns a serializable
//! body; the binary prints it and maps `success = false` to a failing exit
//! status.

use std::path::PathBuf;
use std::time::Instant;

use reminder_common::storage::PoolMetrics;
use reminder_common::ConcurrencyStatsSnapshot;
use reminder_core::ManagerStatus;
use reminder_domain::Result;
use reminder_infra::{MigrationOptions, TableCounts};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::Commands;
use crate::context::AppContext;
use crate::utils::log_command_execution;

/// Result of one command
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutput {
    pub command: &'static str,
    pub success: bool,
    pub body: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub manager: ManagerStatus,
    pub json_path: PathBuf,
    pub json_exists: bool,
    pub sqlite_path: PathBuf,
    /// Present only when SQLite was opened
    pub tables: Option<TableCounts>,
    pub pool: Option<PoolMetrics>,
    pub concurrency: ConcurrencyStatsSnapshot,
}

pub async fn execute(context: &AppContext, command: &Commands) -> Result<CommandOutput> {
    let started = Instant::now();
    let outcome = dispatch(context, command).await;
    let success = outcome.as_ref().is_ok_and(|(success, _)| *success);
    log_command_execution(command.name(), started.elapsed(), success);

    let (success, body) = outcome?;
    Ok(CommandOutput { command: command.name(), success, body })
}

async fn dispatch(context: &AppContext, command: &Commands) -> Result<(bool, Value)> {
    match command {
        Commands::Status => {
            let report = status(context).await?;
            Ok((true, serde_json::to_value(report)?))
        }
        Commands::Migrate { archive, dry_run } => {
            let report = context
                .migrate(MigrationOptions { archive: *archive, dry_run: *dry_run })
                .await?;
            Ok((report.success, serde_json::to_value(report)?))
        }
        Commands::Verify { source } => {
            let report = context.verify(source.as_deref()).await?;
            Ok((report.is_clean(), serde_json::to_value(report)?))
        }
        Commands::Backups => {
            let backups = context.list_backups().await?;
            Ok((true, serde_json::to_value(backups)?))
        }
        Commands::Rollback { backup } => {
            let report = context.rollback(backup).await?;
            Ok((true, serde_json::to_value(report)?))
        }
        Commands::Export { output } => {
            let exported = context.export(output).await?;
            Ok((true, json!({ "output": output, "events": exported })))
        }
    }
}

/// Start the manager, snapshot everything, then shut it down again
pub async fn status(context: &AppContext) -> Result<StatusReport> {
    context.start().await?;

    let (tables, pool) = if context.sqlite.is_initialized() {
        let repository = context.sqlite.repository()?;
        (Some(repository.counts().await?), Some(repository.db().pool_metrics()))
    } else {
        (None, None)
    };
    let report = StatusReport {
        manager: context.events.get_status(),
        json_path: context.json.path().to_path_buf(),
        json_exists: context.json.exists().await,
        sqlite_path: context.sqlite.path().to_path_buf(),
        tables,
        pool,
        concurrency: context.stats.snapshot(),
    };

    context.shutdown().await?;
    Ok(report)
}
