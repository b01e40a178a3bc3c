use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "reminderctl",
    version,
    about = "Operate the reminder bot's event storage",
    long_about = "Inspect storage status, migrate the JSON flat file into SQLite, verify the \
                  result, and roll back or export when needed"
)]
pub struct Cli {
    /// Configuration file (TOML or JSON); probes the standard locations when omitted
    #[arg(long, global = true, env = "REMINDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Initialise storage and print backend, flag and table status
    Status,
    /// Copy the JSON flat file into SQLite in a single transaction
    Migrate {
        /// Move the flat file aside after a successful migration
        #[arg(long)]
        archive: bool,

        /// Validate and count without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare SQLite against a flat file and print an integrity score
    Verify {
        /// Flat file to compare against (defaults to the configured one)
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// List backups of both backends, newest first
    Backups,
    /// Restore a JSON backup and clear the SQLite tables
    Rollback {
        /// Backup file to restore
        backup: PathBuf,
    },
    /// Write every SQLite event to a flat file
    Export {
        /// Destination file
        output: PathBuf,
    },
}

impl Commands {
    /// Stable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Migrate { .. } => "migrate",
            Self::Verify { .. } => "verify",
            Self::Backups => "backups",
            Self::Rollback { .. } => "rollback",
            Self::Export { .. } => "export",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_migrate_flags() {
        let cli = Cli::try_parse_from(["reminderctl", "migrate", "--archive", "--dry-run"])
            .expect("migrate should parse");
        assert_eq!(cli.command, Commands::Migrate { archive: true, dry_run: true });
        assert_eq!(cli.command.name(), "migrate");
    }

    #[test]
    fn rollback_requires_a_backup_path() {
        assert!(Cli::try_parse_from(["reminderctl", "rollback"]).is_err());

        let cli = Cli::try_parse_from([
            "reminderctl",
            "--json-logs",
            "rollback",
            "data/watched_reminders.backup-20250101T000000000Z.json",
        ])
        .expect("rollback should parse");
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Commands::Rollback { .. }));
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["reminderctl", "status", "--config", "bot.toml"])
            .expect("status should parse");
        assert_eq!(cli.config, Some(PathBuf::from("bot.toml")));
    }
}
