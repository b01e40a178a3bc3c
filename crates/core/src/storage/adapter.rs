//! Primary/fallback storage adapter
//!
//! Holds both backends for the life of the process. Which one is primary is
//! decided at [`StorageAdapter::initialize`] from the `SqliteStorage` flag
//! and changes only by swapping the two roles after a failure.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use reminder_domain::constants::DEFAULT_FALLBACK_RETRY_MINUTES;
use reminder_domain::{Event, ReminderError, Result, StorageDocument};
use tracing::{debug, error, info, instrument, warn};

use super::ports::{BackendKind, StorageBackend};
use crate::feature_flags::{
    cascade_for, CascadeAction, FeatureFlag, FeatureFlagManager, CASCADE_RULES,
};

struct Roles {
    primary: Arc<dyn StorageBackend>,
    fallback: Arc<dyn StorageBackend>,
}

/// Routes storage calls to the primary backend, failing over once
pub struct StorageAdapter {
    flags: Arc<FeatureFlagManager>,
    json: Arc<dyn StorageBackend>,
    sqlite: Arc<dyn StorageBackend>,
    roles: RwLock<Roles>,
    switch_count: AtomicU64,
    retry_cooldown: Duration,
}

impl StorageAdapter {
    pub fn new(
        flags: Arc<FeatureFlagManager>,
        json: Arc<dyn StorageBackend>,
        sqlite: Arc<dyn StorageBackend>,
    ) -> Self {
        let roles = Roles { primary: Arc::clone(&json), fallback: Arc::clone(&sqlite) };
        Self {
            flags,
            json,
            sqlite,
            roles: RwLock::new(roles),
            switch_count: AtomicU64::new(0),
            retry_cooldown: Duration::minutes(DEFAULT_FALLBACK_RETRY_MINUTES),
        }
    }

    /// Minimum time in fallback before [`Self::restore_sqlite`] retries
    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = cooldown;
        self
    }

    /// Pick the primary and initialize both backends
    ///
    /// Fails only when neither backend can be initialized.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        let (primary, fallback) = if self.flags.is_enabled(FeatureFlag::SqliteStorage) {
            (Arc::clone(&self.sqlite), Arc::clone(&self.json))
        } else {
            (Arc::clone(&self.json), Arc::clone(&self.sqlite))
        };
        {
            let mut roles = self.roles.write();
            roles.primary = Arc::clone(&primary);
            roles.fallback = Arc::clone(&fallback);
        }

        match primary.initialize().await {
            Ok(()) => {
                info!(backend = %primary.kind(), "Primary storage backend initialized");
                if let Err(err) = fallback.initialize().await {
                    warn!(backend = %fallback.kind(), error = %err, "Fallback backend failed to initialize");
                }
                Ok(())
            }
            Err(primary_err) => {
                error!(backend = %primary.kind(), error = %primary_err, "Primary backend failed to initialize");
                self.fail_over(&primary, &primary_err);

                fallback.initialize().await.map_err(|fallback_err| {
                    error!(backend = %fallback.kind(), error = %fallback_err, "Fallback backend failed to initialize");
                    ReminderError::BackendUnavailable(format!(
                        "{} init failed ({primary_err}); {} init failed ({fallback_err})",
                        primary.kind(),
                        fallback.kind()
                    ))
                })?;
                info!(backend = %fallback.kind(), "Promoted fallback backend to primary");
                Ok(())
            }
        }
    }

    pub async fn save(&self, document: &StorageDocument) -> Result<()> {
        self.with_failover("save", |backend| async move { backend.save(document).await }).await
    }

    pub async fn load(&self) -> Result<StorageDocument> {
        self.with_failover("load", |backend| async move { backend.load().await }).await
    }

    pub async fn backup(&self) -> Result<Option<PathBuf>> {
        self.primary().backup().await
    }

    pub async fn validate_integrity(&self) -> Result<bool> {
        self.primary().validate_integrity().await
    }

    pub async fn fetch_event(&self, message_id: u64) -> Result<Option<Event>> {
        self.primary().fetch_event(message_id).await
    }

    pub async fn fetch_events(&self, guild_id: Option<u64>) -> Result<Vec<Event>> {
        self.primary().fetch_events(guild_id).await
    }

    pub async fn fetch_due_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        self.primary().fetch_due_events(now).await
    }

    pub async fn record_reminder(
        &self,
        message_id: u64,
        sent_at: DateTime<Utc>,
        users_notified: usize,
    ) -> Result<()> {
        self.primary().record_reminder(message_id, sent_at, users_notified).await
    }

    /// Clean up both backends; the first failure is returned after both ran
    pub async fn cleanup(&self) -> Result<()> {
        let (json, sqlite) = futures::join!(self.json.cleanup(), self.sqlite.cleanup());
        for (kind, result) in [(BackendKind::Json, &json), (BackendKind::Sqlite, &sqlite)] {
            if let Err(err) = result {
                warn!(backend = %kind, error = %err, "Backend cleanup failed");
            }
        }
        json.and(sqlite)
    }

    /// Move back to SQLite after a fallback once the cooldown has passed
    ///
    /// Returns `true` when SQLite became primary again. The caller owns the
    /// data and must save it, since SQLite missed every write made while it
    /// was out.
    pub async fn restore_sqlite(&self) -> Result<bool> {
        if self.is_using_sqlite() {
            return Ok(false);
        }
        let state = self.flags.state(FeatureFlag::SqliteStorage);
        if !state.enabled || !state.in_fallback() {
            return Ok(false);
        }
        if !self.flags.can_retry_at(FeatureFlag::SqliteStorage, self.retry_cooldown, Utc::now()) {
            debug!("SQLite still cooling down after fallback");
            return Ok(false);
        }

        self.sqlite.initialize().await?;

        self.flags.clear_fallback(FeatureFlag::SqliteStorage);
        for action in cascade_for(CASCADE_RULES, FeatureFlag::SqliteStorage) {
            if let CascadeAction::Fallback(dependent) = action {
                self.flags.clear_fallback(*dependent);
            }
        }

        let mut roles = self.roles.write();
        roles.primary = Arc::clone(&self.sqlite);
        roles.fallback = Arc::clone(&self.json);
        self.switch_count.fetch_add(1, Ordering::SeqCst);
        info!("SQLite restored as primary storage backend");
        Ok(true)
    }

    pub fn active_backend(&self) -> BackendKind {
        self.roles.read().primary.kind()
    }

    pub fn is_using_sqlite(&self) -> bool {
        self.active_backend() == BackendKind::Sqlite
    }

    pub fn is_using_json(&self) -> bool {
        self.active_backend() == BackendKind::Json
    }

    /// Number of primary/fallback swaps since startup
    pub fn switch_count(&self) -> u64 {
        self.switch_count.load(Ordering::SeqCst)
    }

    fn primary(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.roles.read().primary)
    }

    async fn with_failover<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Fn(Arc<dyn StorageBackend>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let primary = self.primary();
        let first_err = match call(Arc::clone(&primary)).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        warn!(op, backend = %primary.kind(), error = %first_err, "Storage operation failed; failing over");

        self.fail_over(&primary, &first_err);
        let replacement = self.primary();

        // The standby may have missed its eager init at startup
        let retried = async {
            replacement.initialize().await?;
            call(Arc::clone(&replacement)).await
        };
        retried.await.map_err(|retry_err| {
            error!(op, backend = %replacement.kind(), error = %retry_err, "Storage operation failed on fallback");
            ReminderError::BackendUnavailable(format!(
                "{op} failed on {} ({first_err}) and {} ({retry_err})",
                primary.kind(),
                replacement.kind()
            ))
        })
    }

    /// Swap roles if `failed` is still primary
    ///
    /// A concurrent caller that already swapped leaves nothing to do, so the
    /// switch happens once per failure.
    fn fail_over(&self, failed: &Arc<dyn StorageBackend>, cause: &ReminderError) {
        let mut roles = self.roles.write();
        if !Arc::ptr_eq(&roles.primary, failed) {
            debug!(backend = %failed.kind(), "Backend already swapped out");
            return;
        }

        if failed.kind() == BackendKind::Sqlite {
            self.flags.trigger_fallback(FeatureFlag::SqliteStorage, &cause.to_string());
        }

        let Roles { primary, fallback } = &mut *roles;
        std::mem::swap(primary, fallback);
        let switches = self.switch_count.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(from = %failed.kind(), to = %roles.primary.kind(), switches, "Storage backend switched");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use reminder_domain::FeatureFlagConfig;

    use super::*;
    use crate::testing::MemoryBackend;

    fn sqlite_flags() -> Arc<FeatureFlagManager> {
        Arc::new(FeatureFlagManager::new(&FeatureFlagConfig {
            sqlite_storage: true,
            ..FeatureFlagConfig::default()
        }))
    }

    fn adapter(
        flags: &Arc<FeatureFlagManager>,
        json: &Arc<MemoryBackend>,
        sqlite: &Arc<MemoryBackend>,
    ) -> StorageAdapter {
        StorageAdapter::new(
            Arc::clone(flags),
            Arc::clone(json) as Arc<dyn StorageBackend>,
            Arc::clone(sqlite) as Arc<dyn StorageBackend>,
        )
    }

    #[tokio::test]
    async fn primary_follows_sqlite_flag() {
        let json = Arc::new(MemoryBackend::new(BackendKind::Json));
        let sqlite = Arc::new(MemoryBackend::new(BackendKind::Sqlite));

        let off = adapter(&Arc::new(FeatureFlagManager::default()), &json, &sqlite);
        off.initialize().await.expect("init");
        assert!(off.is_using_json());

        let on = adapter(&sqlite_flags(), &json, &sqlite);
        on.initialize().await.expect("init");
        assert!(on.is_using_sqlite());
        assert_eq!(sqlite.init_calls.load(Ordering::SeqCst), 2, "fallback initialized eagerly");
    }

    #[tokio::test]
    async fn init_failure_promotes_fallback() {
        let flags = sqlite_flags();
        let json = Arc::new(MemoryBackend::new(BackendKind::Json));
        let sqlite = Arc::new(MemoryBackend::failing(BackendKind::Sqlite));
        let adapter = adapter(&flags, &json, &sqlite);

        adapter.initialize().await.expect("json takes over");

        assert!(adapter.is_using_json());
        assert_eq!(adapter.switch_count(), 1);
        assert!(!flags.is_enabled(FeatureFlag::SqliteStorage));
    }

    #[tokio::test]
    async fn both_backends_failing_is_fatal() {
        let json = Arc::new(MemoryBackend::failing(BackendKind::Json));
        let sqlite = Arc::new(MemoryBackend::failing(BackendKind::Sqlite));
        let adapter = adapter(&sqlite_flags(), &json, &sqlite);

        let err = adapter.initialize().await.expect_err("both down");
        assert!(matches!(err, ReminderError::BackendUnavailable(_)), "{err}");
    }

    /// Tests that repeated failures on the same backend switch only once
    #[tokio::test]
    async fn failover_is_idempotent() {
        let flags = sqlite_flags();
        let json = Arc::new(MemoryBackend::new(BackendKind::Json));
        let sqlite = Arc::new(MemoryBackend::new(BackendKind::Sqlite));
        let adapter = adapter(&flags, &json, &sqlite);
        adapter.initialize().await.expect("init");

        sqlite.set_failing(true);
        let doc = StorageDocument::new();
        adapter.save(&doc).await.expect("first save lands on json");
        adapter.save(&doc).await.expect("second save stays on json");
        adapter.load().await.expect("load from json");

        assert_eq!(adapter.switch_count(), 1);
        assert!(adapter.is_using_json());
        assert!(flags.state(FeatureFlag::SqliteStorage).in_fallback());
        assert_eq!(sqlite.save_calls.load(Ordering::SeqCst), 1);
        assert_eq!(json.save_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn json_failure_does_not_touch_sqlite_flag() {
        let flags = Arc::new(FeatureFlagManager::default());
        let json = Arc::new(MemoryBackend::new(BackendKind::Json));
        let sqlite = Arc::new(MemoryBackend::new(BackendKind::Sqlite));
        let adapter = adapter(&flags, &json, &sqlite);
        adapter.initialize().await.expect("init");

        json.set_failing(true);
        adapter.save(&StorageDocument::new()).await.expect("sqlite takes over");

        assert!(adapter.is_using_sqlite());
        assert!(flags.get_fallback_flags().is_empty());
    }

    /// Tests that a standby whose startup init failed is initialized on failover
    #[tokio::test]
    async fn failover_initializes_standby_that_missed_startup() {
        let flags = Arc::new(FeatureFlagManager::default());
        let json = Arc::new(MemoryBackend::new(BackendKind::Json));
        let sqlite = Arc::new(MemoryBackend::failing(BackendKind::Sqlite));
        let adapter = adapter(&flags, &json, &sqlite);
        adapter.initialize().await.expect("json primary is enough");
        assert!(!sqlite.is_initialized());

        sqlite.set_failing(false);
        json.fail_save.store(true, Ordering::SeqCst);
        let doc = StorageDocument::from_events([Event::new(
            100,
            10,
            1,
            "Raid night",
            60.0,
            vec!["✅".into()],
            Utc::now(),
        )]);
        adapter.save(&doc).await.expect("sqlite takes over");

        assert!(adapter.is_using_sqlite());
        assert!(sqlite.is_initialized());
        assert_eq!(sqlite.init_calls.load(Ordering::SeqCst), 2);
        assert_eq!(sqlite.document(), doc);
    }

    #[tokio::test]
    async fn standby_init_failure_is_the_second_failure() {
        let flags = Arc::new(FeatureFlagManager::default());
        let json = Arc::new(MemoryBackend::new(BackendKind::Json));
        let sqlite = Arc::new(MemoryBackend::failing(BackendKind::Sqlite));
        let adapter = adapter(&flags, &json, &sqlite);
        adapter.initialize().await.expect("init");

        json.fail_save.store(true, Ordering::SeqCst);
        let err = adapter.save(&StorageDocument::new()).await.expect_err("both down");

        assert!(matches!(err, ReminderError::BackendUnavailable(_)), "{err}");
        assert!(err.to_string().contains("initialize failed"), "{err}");
        assert_eq!(sqlite.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn second_failure_is_surfaced() {
        let json = Arc::new(MemoryBackend::new(BackendKind::Json));
        let sqlite = Arc::new(MemoryBackend::new(BackendKind::Sqlite));
        let adapter = adapter(&sqlite_flags(), &json, &sqlite);
        adapter.initialize().await.expect("init");

        json.set_failing(true);
        sqlite.set_failing(true);
        let err = adapter.load().await.expect_err("both down");

        assert!(matches!(err, ReminderError::BackendUnavailable(_)), "{err}");
        assert_eq!(adapter.switch_count(), 1);
    }

    #[tokio::test]
    async fn restore_waits_for_cooldown() {
        let flags = sqlite_flags();
        let json = Arc::new(MemoryBackend::new(BackendKind::Json));
        let sqlite = Arc::new(MemoryBackend::failing(BackendKind::Sqlite));
        let adapter = adapter(&flags, &json, &sqlite);
        adapter.initialize().await.expect("init");
        assert!(adapter.is_using_json());

        sqlite.set_failing(false);
        assert!(!adapter.restore_sqlite().await.expect("cooldown check"));

        let adapter = adapter.with_retry_cooldown(Duration::zero());
        assert!(adapter.restore_sqlite().await.expect("restore"));
        assert!(adapter.is_using_sqlite());
        assert!(flags.is_enabled(FeatureFlag::SqliteStorage));
        assert!(flags.get_fallback_flags().is_empty());
        assert_eq!(adapter.switch_count(), 2);
    }

    #[tokio::test]
    async fn cleanup_runs_on_both_backends() {
        let json = Arc::new(MemoryBackend::new(BackendKind::Json));
        let sqlite = Arc::new(MemoryBackend::new(BackendKind::Sqlite));
        let adapter = adapter(&sqlite_flags(), &json, &sqlite);

        adapter.cleanup().await.expect("cleanup");

        assert_eq!(json.cleanup_calls.load(Ordering::SeqCst), 1);
        assert_eq!(sqlite.cleanup_calls.load(Ordering::SeqCst), 1);
    }
}
