//! Per-guild async locks
//!
//! One `tokio::sync::Mutex` per guild id, created lazily and kept for the life
//! of the registry. Repeated lookups for the same id return the same mutex, so
//! operations on one guild are serialised in acquisition order (tokio's mutex
//! is FIFO-fair) while different guilds proceed independently.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use super::stats::ConcurrencyStats;

/// Registry of per-guild mutexes
#[derive(Debug, Default)]
pub struct GuildLocks {
    locks: DashMap<u64, Arc<Mutex<()>>>,
    stats: Option<Arc<ConcurrencyStats>>,
}

impl GuildLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that reports acquisitions to `stats`
    pub fn with_stats(stats: Arc<ConcurrencyStats>) -> Self {
        Self { locks: DashMap::new(), stats: Some(stats) }
    }

    /// The mutex for `guild_id`, created on first use
    pub fn lock_for(&self, guild_id: u64) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(guild_id).or_insert_with(|| Arc::new(Mutex::new(()))).value())
    }

    /// Wait for the guild's mutex and return an owned guard
    pub async fn acquire(&self, guild_id: u64) -> OwnedMutexGuard<()> {
        let lock = self.lock_for(guild_id);
        let started = Instant::now();
        let guard = lock.lock_owned().await;
        let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if let Some(stats) = &self.stats {
            stats.record_lock_acquired(waited_ms);
        }
        trace!(guild_id, waited_ms, "guild lock acquired");
        guard
    }

    /// Run `op` while holding the guild's lock
    pub async fn with_guild_lock<F, Fut, T>(&self, guild_id: u64, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(guild_id).await;
        op().await
    }

    /// Number of guilds that have a lock allocated
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
