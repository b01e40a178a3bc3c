//! Event manager used by the command layer
//!
//! Keeps every watched event in an in-memory [`StorageDocument`] and persists
//! the whole document through the [`StorageAdapter`] after each mutation.
//! A failed save reverts the mutation, so the cache never holds changes that
//! neither backend accepted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reminder_common::sync::DEFAULT_DEBOUNCE_DELAY;
use reminder_common::{ConcurrencyStats, DebouncedUpdateQueue};
use reminder_domain::{Event, ReactionRecord, ReminderError, Result, StorageDocument};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::feature_flags::{FeatureFlag, FeatureFlagManager, FlagSummary};
use crate::storage::{BackendKind, StorageAdapter};

/// Lifecycle of a [`UnifiedEventManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Snapshot returned by [`UnifiedEventManager::get_status`]
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub state: ManagerState,
    pub active_backend: BackendKind,
    pub cached_events: usize,
    pub dirty: bool,
    pub backend_switches: u64,
    pub pending_reaction_updates: usize,
    pub feature_flags: FlagSummary,
}

/// Single entry point for event reads and writes
pub struct UnifiedEventManager {
    adapter: Arc<StorageAdapter>,
    flags: Arc<FeatureFlagManager>,
    cache: RwLock<StorageDocument>,
    state: RwLock<ManagerState>,
    dirty: AtomicBool,
    write_gate: Mutex<()>,
    reaction_updates: DebouncedUpdateQueue<u64>,
}

impl UnifiedEventManager {
    pub fn new(adapter: Arc<StorageAdapter>, flags: Arc<FeatureFlagManager>) -> Self {
        Self::with_debounce(adapter, flags, DEFAULT_DEBOUNCE_DELAY, Arc::new(ConcurrencyStats::new()))
    }

    /// Custom quiet period for [`Self::schedule_reaction_update`]
    pub fn with_debounce(
        adapter: Arc<StorageAdapter>,
        flags: Arc<FeatureFlagManager>,
        delay: Duration,
        stats: Arc<ConcurrencyStats>,
    ) -> Self {
        Self {
            adapter,
            flags,
            cache: RwLock::new(StorageDocument::new()),
            state: RwLock::new(ManagerState::Uninitialized),
            dirty: AtomicBool::new(false),
            write_gate: Mutex::new(()),
            reaction_updates: DebouncedUpdateQueue::with_stats(delay, stats),
        }
    }

    pub fn state(&self) -> ManagerState {
        *self.state.read()
    }

    /// Initialize storage and fill the cache; a no-op when already ready
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            match *state {
                ManagerState::Ready => return Ok(()),
                ManagerState::Initializing => {
                    return Err(ReminderError::NotReady("initialization in progress".into()))
                }
                ManagerState::Uninitialized => *state = ManagerState::Initializing,
            }
        }

        let loaded = async {
            self.adapter.initialize().await?;
            self.adapter.load().await
        }
        .await;

        match loaded {
            Ok(document) => {
                let count = document.len();
                *self.cache.write() = document;
                self.dirty.store(false, Ordering::SeqCst);
                *self.state.write() = ManagerState::Ready;
                info!(events = count, backend = %self.adapter.active_backend(), "Event manager ready");
                Ok(())
            }
            Err(err) => {
                *self.state.write() = ManagerState::Uninitialized;
                Err(err)
            }
        }
    }

    /// Start watching `event`
    pub async fn add_event(&self, event: Event) -> Result<()> {
        self.validate(&event)?;
        let message_id = event.message_id;
        self.mutate(move |doc| {
            if doc.get(message_id).is_some() {
                return Err(ReminderError::InvalidInput(format!(
                    "event {message_id} is already watched"
                )));
            }
            doc.insert(event);
            Ok(())
        })
        .await?;
        info!(message_id, "Event added");
        Ok(())
    }

    /// Stop watching; returns the removed event
    pub async fn remove_event(&self, message_id: u64) -> Result<Event> {
        let removed = self
            .mutate(move |doc| doc.remove(message_id).ok_or_else(|| not_found(message_id)))
            .await?;
        info!(message_id, "Event removed");
        Ok(removed)
    }

    /// Replace an existing event; returns the previous version
    pub async fn update_event(&self, event: Event) -> Result<Event> {
        self.validate(&event)?;
        let message_id = event.message_id;
        self.mutate(move |doc| {
            if doc.get(message_id).is_none() {
                return Err(not_found(message_id));
            }
            doc.insert(event).ok_or_else(|| not_found(message_id))
        })
        .await
    }

    pub async fn pause_event(&self, message_id: u64) -> Result<()> {
        self.set_paused(message_id, true).await
    }

    pub async fn resume_event(&self, message_id: u64) -> Result<()> {
        self.set_paused(message_id, false).await
    }

    async fn set_paused(&self, message_id: u64, paused: bool) -> Result<()> {
        self.mutate(move |doc| {
            let event = doc.events.get_mut(&message_id).ok_or_else(|| not_found(message_id))?;
            event.is_paused = paused;
            Ok(())
        })
        .await?;
        info!(message_id, paused, "Event pause state changed");
        Ok(())
    }

    pub async fn mark_reminder_sent(&self, message_id: u64) -> Result<()> {
        self.mark_reminder_sent_at(message_id, Utc::now()).await
    }

    /// Record a reminder sent at `at`, then log it where the backend keeps a
    /// reminder log
    pub async fn mark_reminder_sent_at(&self, message_id: u64, at: DateTime<Utc>) -> Result<()> {
        let notified = self
            .mutate(move |doc| {
                let event =
                    doc.events.get_mut(&message_id).ok_or_else(|| not_found(message_id))?;
                event.mark_reminder_sent(at);
                Ok(event.missing_users().len())
            })
            .await?;

        if let Err(err) = self.adapter.record_reminder(message_id, at, notified).await {
            warn!(message_id, error = %err, "Failed to record reminder log entry");
        }
        debug!(message_id, notified, "Reminder marked as sent");
        Ok(())
    }

    /// Replace the reaction set of an event
    pub async fn update_reactions(
        &self,
        message_id: u64,
        reactions: Vec<ReactionRecord>,
    ) -> Result<()> {
        let count = reactions.len();
        self.mutate(move |doc| {
            let event = doc.events.get_mut(&message_id).ok_or_else(|| not_found(message_id))?;
            event.set_reactions(reactions);
            Ok(())
        })
        .await?;
        debug!(message_id, reactions = count, "Reactions updated");
        Ok(())
    }

    /// Debounced [`Self::update_reactions`]; only the last call for a message
    /// within the quiet period is applied
    pub fn schedule_reaction_update(self: &Arc<Self>, message_id: u64, reactions: Vec<ReactionRecord>) {
        let manager: Weak<Self> = Arc::downgrade(self);
        self.reaction_updates.schedule_update(message_id, move || async move {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            if let Err(err) = manager.update_reactions(message_id, reactions).await {
                warn!(message_id, error = %err, "Debounced reaction update failed");
            }
        });
    }

    pub fn pending_reaction_updates(&self) -> usize {
        self.reaction_updates.pending_count()
    }

    pub async fn get_event(&self, message_id: u64) -> Result<Option<Event>> {
        self.ensure_ready()?;
        match self.adapter.fetch_event(message_id).await {
            Ok(event) => Ok(event),
            Err(err) => {
                warn!(message_id, error = %err, "Backend read failed; serving from cache");
                Ok(self.cache.read().get(message_id).cloned())
            }
        }
    }

    /// Every event, optionally restricted to one guild
    pub async fn get_all_events(&self, guild_id: Option<u64>) -> Result<Vec<Event>> {
        self.ensure_ready()?;
        match self.adapter.fetch_events(guild_id).await {
            Ok(events) => Ok(events),
            Err(err) => {
                warn!(?guild_id, error = %err, "Backend read failed; serving from cache");
                let cache = self.cache.read();
                Ok(cache
                    .events
                    .values()
                    .filter(|e| guild_id.map_or(true, |g| e.guild_id == g))
                    .cloned()
                    .collect())
            }
        }
    }

    pub async fn get_due_events(&self) -> Result<Vec<Event>> {
        self.get_due_events_at(Utc::now()).await
    }

    pub async fn get_due_events_at(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        self.ensure_ready()?;
        match self.adapter.fetch_due_events(now).await {
            Ok(events) => Ok(events),
            Err(err) => {
                warn!(error = %err, "Backend read failed; serving due events from cache");
                Ok(self.cache.read().due_events(now).cloned().collect())
            }
        }
    }

    /// Persist the cache as is
    pub async fn save_to_storage(&self) -> Result<()> {
        self.ensure_ready()?;
        let _gate = self.write_gate.lock().await;
        let snapshot = self.cache.read().clone();
        self.adapter.save(&snapshot).await?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Replace the cache with what storage holds; returns the event count
    pub async fn load_from_storage(&self) -> Result<usize> {
        self.ensure_ready()?;
        let _gate = self.write_gate.lock().await;
        let document = self.adapter.load().await?;
        let count = document.len();
        *self.cache.write() = document;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(count)
    }

    pub async fn validate_data_integrity(&self) -> Result<bool> {
        let valid = self.adapter.validate_integrity().await?;
        if !valid {
            warn!(backend = %self.adapter.active_backend(), "Storage integrity check failed");
        }
        Ok(valid)
    }

    pub async fn backup_data(&self) -> Result<Option<PathBuf>> {
        self.adapter.backup().await
    }

    /// Move back to SQLite once its fallback cooldown has passed
    ///
    /// The cache is written to SQLite straight away since it missed every
    /// write made while it was out.
    pub async fn retry_primary_backend(&self) -> Result<bool> {
        self.ensure_ready()?;
        if !self.adapter.restore_sqlite().await? {
            return Ok(false);
        }
        self.save_to_storage().await?;
        Ok(true)
    }

    pub fn get_status(&self) -> ManagerStatus {
        ManagerStatus {
            state: self.state(),
            active_backend: self.adapter.active_backend(),
            cached_events: self.cache.read().len(),
            dirty: self.dirty.load(Ordering::SeqCst),
            backend_switches: self.adapter.switch_count(),
            pending_reaction_updates: self.reaction_updates.pending_count(),
            feature_flags: self.flags.summary(),
        }
    }

    /// Flush, cancel pending reaction updates and release both backends
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        if self.state() == ManagerState::Ready && self.dirty.load(Ordering::SeqCst) {
            if let Err(err) = self.save_to_storage().await {
                warn!(error = %err, "Final flush failed during shutdown");
            }
        }

        let cancelled = self.reaction_updates.cancel_all();
        if cancelled > 0 {
            info!(cancelled, "Cancelled pending reaction updates");
        }

        *self.state.write() = ManagerState::Uninitialized;
        self.adapter.cleanup().await
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            ManagerState::Ready => Ok(()),
            other => Err(ReminderError::NotReady(format!("event manager is {other:?}"))),
        }
    }

    fn validate(&self, event: &Event) -> Result<()> {
        let strict = self.flags.is_enabled(FeatureFlag::StrictValidation);
        let errors = event.validation_errors(strict);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ReminderError::Validation(errors))
        }
    }

    /// Apply `change` to the cache and persist the full snapshot
    ///
    /// Mutations are serialized by the write gate. When `change` fails or
    /// the save fails on both backends the cache is restored.
    async fn mutate<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut StorageDocument) -> Result<T>,
    {
        self.ensure_ready()?;
        let _gate = self.write_gate.lock().await;

        let (value, snapshot, previous) = {
            let mut cache = self.cache.write();
            let previous = cache.clone();
            match change(&mut *cache) {
                Ok(value) => (value, cache.clone(), previous),
                Err(err) => {
                    *cache = previous;
                    return Err(err);
                }
            }
        };

        let was_dirty = self.dirty.swap(true, Ordering::SeqCst);
        match self.adapter.save(&snapshot).await {
            Ok(()) => {
                self.dirty.store(false, Ordering::SeqCst);
                Ok(value)
            }
            Err(err) => {
                *self.cache.write() = previous;
                self.dirty.store(was_dirty, Ordering::SeqCst);
                Err(err)
            }
        }
    }
}

fn not_found(message_id: u64) -> ReminderError {
    ReminderError::not_found(format!("event {message_id}"))
}
