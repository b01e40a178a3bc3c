//! Application context - dependency injection container
//!
//! Every shared component is constructed exactly once here and handed to its
//! consumers as an `Arc`. The feature flag manager and the concurrency
//! statistics are the only process-wide state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reminder_common::ConcurrencyStats;
use reminder_core::{FeatureFlag, FeatureFlagManager, StorageAdapter, StorageBackend, UnifiedEventManager};
use reminder_domain::{Config, ReminderError, Result};
use reminder_infra::migration::{RollbackReport, VerificationReport};
use reminder_infra::{
    BackupFile, JsonStorageBackend, JsonToSqliteMigrator, MigrationOptions, MigrationReport,
    MigrationVerifier, RollbackManager, SqliteStorageBackend,
};
use tracing::{info, warn};

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub stats: Arc<ConcurrencyStats>,
    pub feature_flags: Arc<FeatureFlagManager>,
    pub json: Arc<JsonStorageBackend>,
    pub sqlite: Arc<SqliteStorageBackend>,
    pub adapter: Arc<StorageAdapter>,
    pub events: Arc<UnifiedEventManager>,
}

impl AppContext {
    /// Create a context from the loaded configuration (file, then
    /// environment overrides)
    ///
    /// # Errors
    /// Returns `ReminderError::Config` when the configuration is invalid.
    pub fn new() -> Result<Self> {
        let config = reminder_infra::config::load()?;
        Ok(Self::new_with_config(config))
    }

    /// Create a context with custom configuration
    ///
    /// Nothing touches the disk until [`Self::start`] or one of the
    /// migration operations runs.
    pub fn new_with_config(config: Config) -> Self {
        let stats = Arc::new(ConcurrencyStats::new());
        let feature_flags = Arc::new(FeatureFlagManager::new(&config.feature_flags));

        let json = Arc::new(JsonStorageBackend::from_config(&config.storage));
        let sqlite =
            Arc::new(SqliteStorageBackend::from_config(&config.storage, Arc::clone(&stats)));

        let adapter = Arc::new(
            StorageAdapter::new(
                Arc::clone(&feature_flags),
                Arc::clone(&json) as Arc<dyn StorageBackend>,
                Arc::clone(&sqlite) as Arc<dyn StorageBackend>,
            )
            .with_retry_cooldown(chrono::Duration::minutes(
                config.storage.fallback_retry_minutes,
            )),
        );

        let events = Arc::new(UnifiedEventManager::with_debounce(
            Arc::clone(&adapter),
            Arc::clone(&feature_flags),
            Duration::from_millis(config.storage.debounce_ms),
            Arc::clone(&stats),
        ));

        info!(
            json_path = %config.storage.json_path.display(),
            sqlite_path = %config.storage.sqlite_path.display(),
            sqlite_storage = feature_flags.is_enabled(FeatureFlag::SqliteStorage),
            "application context created"
        );

        Self { config, stats, feature_flags, json, sqlite, adapter, events }
    }

    /// Initialise storage and load the event cache
    pub async fn start(&self) -> Result<()> {
        self.events.initialize().await
    }

    /// Flush pending writes and release both backends
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutdown called on AppContext");
        self.events.shutdown().await?;

        let stats = self.stats.snapshot();
        info!(
            transactions_committed = stats.transactions_committed,
            transactions_rolled_back = stats.transactions_rolled_back,
            retries = stats.retries,
            "storage_shutdown_complete"
        );
        Ok(())
    }

    pub fn migrator(&self) -> JsonToSqliteMigrator {
        JsonToSqliteMigrator::new(Arc::clone(&self.json), Arc::clone(&self.sqlite))
    }

    pub fn rollback_manager(&self) -> RollbackManager {
        RollbackManager::new(Arc::clone(&self.json), Arc::clone(&self.sqlite))
    }

    /// Migrate the flat file into SQLite
    ///
    /// A failed run puts `sqlite_migration` into fallback, which cascades to
    /// degraded mode.
    pub async fn migrate(&self, options: MigrationOptions) -> Result<MigrationReport> {
        if !self.feature_flags.is_enabled(FeatureFlag::SqliteMigration) {
            info!(
                flag = FeatureFlag::SqliteMigration.env_var(),
                "migration requested while the flag is disabled"
            );
        }

        match self.migrator().migrate(options).await {
            Ok(report) if report.success => Ok(report),
            Ok(report) => {
                let reason = report
                    .errors
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "migration did not complete".to_string());
                self.feature_flags.trigger_fallback(FeatureFlag::SqliteMigration, &reason);
                Ok(report)
            }
            Err(err) => {
                warn!(error = %err, "migration failed");
                self.feature_flags
                    .trigger_fallback(FeatureFlag::SqliteMigration, &err.to_string());
                Err(err)
            }
        }
    }

    /// Compare SQLite against a flat file (the live one when `source` is
    /// `None`)
    pub async fn verify(&self, source: Option<&Path>) -> Result<VerificationReport> {
        let reader = source.map_or_else(
            || Arc::clone(&self.json),
            |path| Arc::new(JsonStorageBackend::new(path)),
        );
        let raw = reader.read_raw().await?.ok_or_else(|| {
            ReminderError::not_found(format!("flat file {}", reader.path().display()))
        })?;

        self.sqlite.initialize().await?;
        MigrationVerifier::new(Arc::clone(&self.sqlite)).verify(&raw).await
    }

    /// Every backup of both backends, newest first
    pub async fn list_backups(&self) -> Result<Vec<BackupFile>> {
        let mut backups = self.json.list_backups().await?;
        backups.extend(self.sqlite.list_backups().await?);
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    pub async fn rollback(&self, backup: &Path) -> Result<RollbackReport> {
        self.rollback_manager().rollback(backup).await
    }

    pub async fn export(&self, target: &Path) -> Result<usize> {
        self.rollback_manager().export_to_json(target).await
    }
}
