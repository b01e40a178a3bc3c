//! Integration tests for storage failover through the public core API
//!
//! Tests verify that the event manager keeps serving writes while SQLite is
//! out, that the flag cascade is visible to callers, and that SQLite can be
//! restored once its cooldown has passed.

use std::sync::Arc;

use chrono::{Duration, Utc};
use reminder_core::testing::MemoryBackend;
use reminder_core::{
    BackendKind, FeatureFlag, FeatureFlagManager, StorageAdapter, StorageBackend,
    UnifiedEventManager,
};
use reminder_domain::{Event, FeatureFlagConfig, ReminderError};

struct Stack {
    flags: Arc<FeatureFlagManager>,
    json: Arc<MemoryBackend>,
    sqlite: Arc<MemoryBackend>,
    adapter: Arc<StorageAdapter>,
    manager: Arc<UnifiedEventManager>,
}

fn stack(cooldown: Duration) -> Stack {
    let flags = Arc::new(FeatureFlagManager::new(&FeatureFlagConfig {
        sqlite_storage: true,
        sqlite_backup: true,
        sqlite_scheduler: true,
        ..FeatureFlagConfig::default()
    }));
    let json = Arc::new(MemoryBackend::new(BackendKind::Json));
    let sqlite = Arc::new(MemoryBackend::new(BackendKind::Sqlite));
    let adapter = Arc::new(
        StorageAdapter::new(
            Arc::clone(&flags),
            Arc::clone(&json) as Arc<dyn StorageBackend>,
            Arc::clone(&sqlite) as Arc<dyn StorageBackend>,
        )
        .with_retry_cooldown(cooldown),
    );
    let manager = Arc::new(UnifiedEventManager::new(Arc::clone(&adapter), Arc::clone(&flags)));
    Stack { flags, json, sqlite, adapter, manager }
}

fn event(message_id: u64, guild_id: u64) -> Event {
    Event::new(message_id, 10, guild_id, "Check-in", 30.0, vec!["✅".into()], Utc::now())
}

/// Tests the full outage cycle: SQLite fails, JSON takes over, SQLite returns
#[tokio::test]
async fn sqlite_outage_and_recovery() {
    let stack = stack(Duration::zero());
    stack.manager.initialize().await.expect("manager should initialise");
    stack.manager.add_event(event(1, 1)).await.expect("first add on sqlite");
    assert!(stack.adapter.is_using_sqlite());

    stack.sqlite.set_failing(true);
    stack.manager.add_event(event(2, 1)).await.expect("second add fails over");

    assert!(stack.adapter.is_using_json());
    assert_eq!(stack.json.document().len(), 2, "json received the whole cache");
    assert!(stack.flags.state(FeatureFlag::SqliteStorage).in_fallback());
    assert!(stack.flags.state(FeatureFlag::SqliteBackup).in_fallback());
    assert!(!stack.flags.is_enabled(FeatureFlag::SqliteScheduler));

    stack.sqlite.set_failing(false);
    assert!(stack.manager.retry_primary_backend().await.expect("retry"));

    assert!(stack.adapter.is_using_sqlite());
    assert_eq!(stack.sqlite.document().len(), 2, "sqlite caught up on missed writes");
    assert!(stack.flags.get_fallback_flags().is_empty());
    assert_eq!(stack.adapter.switch_count(), 2);
}

#[tokio::test]
async fn retry_waits_for_cooldown() {
    let stack = stack(Duration::minutes(30));
    stack.manager.initialize().await.expect("init");
    stack.sqlite.set_failing(true);
    stack.manager.add_event(event(1, 1)).await.expect("add fails over");
    stack.sqlite.set_failing(false);

    assert!(!stack.manager.retry_primary_backend().await.expect("retry"));
    assert!(stack.adapter.is_using_json());
}

#[tokio::test]
async fn both_backends_down_is_unavailable() {
    let stack = stack(Duration::zero());
    stack.sqlite.set_failing(true);
    stack.json.set_failing(true);

    let err = stack.manager.initialize().await.expect_err("nothing can initialise");

    assert!(matches!(err, ReminderError::BackendUnavailable(_)), "{err}");
    assert!(stack.manager.get_event(1).await.is_err(), "manager stays uninitialised");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_across_guilds_all_persist() {
    let stack = stack(Duration::zero());
    stack.manager.initialize().await.expect("init");

    let mut handles = Vec::new();
    for i in 0..20_u64 {
        let manager = Arc::clone(&stack.manager);
        handles.push(tokio::spawn(async move { manager.add_event(event(100 + i, 1 + i % 4)).await }));
    }
    for handle in handles {
        handle.await.expect("task should join").expect("add should succeed");
    }

    assert_eq!(stack.sqlite.document().len(), 20);
    assert_eq!(stack.sqlite.saves(), 20);
    for guild_id in 1..=4 {
        let events = stack.manager.get_all_events(Some(guild_id)).await.expect("guild events");
        assert_eq!(events.len(), 5);
    }
}
