//! Debounced update queue
//!
//! `schedule_update(key, f)` replaces any pending update for `key` and runs
//! `f` once the key has been quiet for the configured delay. Each pending
//! update is a spawned tokio task; rescheduling aborts the previous task.
//!
//! A task removes its own map entry before running the update, so an update
//! that has started is never aborted by a later schedule for the same key.
//! The later schedule simply queues a fresh update behind it.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use super::stats::ConcurrencyStats;

/// Quiet period used when none is configured
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_secs(1);

struct PendingUpdate {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-key debouncer backed by cancellable tokio tasks
///
/// Must be used from within a tokio runtime.
pub struct DebouncedUpdateQueue<K> {
    delay: Duration,
    pending: Arc<Mutex<HashMap<K, PendingUpdate>>>,
    generation: AtomicU64,
    stats: Arc<ConcurrencyStats>,
}

impl<K> DebouncedUpdateQueue<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self::with_stats(delay, Arc::new(ConcurrencyStats::new()))
    }

    pub fn with_stats(delay: Duration, stats: Arc<ConcurrencyStats>) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            stats,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `update` for `key`, replacing any pending update for that key
    pub fn schedule_update<F, Fut>(&self, key: K, update: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let delay = self.delay;
        let pending = Arc::clone(&self.pending);
        let stats = Arc::clone(&self.stats);
        let task_key = key.clone();

        let mut map = self.pending.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut map = pending.lock();
                match map.get(&task_key) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(&task_key);
                    }
                    _ => return,
                }
            }

            debug!(key = ?task_key, "running debounced update");
            update().await;
            stats.record_debounce_executed();
        });

        if let Some(previous) = map.insert(key, PendingUpdate { generation, handle }) {
            previous.handle.abort();
            self.stats.record_debounce_cancelled();
        }
        self.stats.record_debounce_scheduled();
    }

    /// Cancel the pending update for `key`; returns whether one was pending
    pub fn cancel(&self, key: &K) -> bool {
        match self.pending.lock().remove(key) {
            Some(entry) => {
                entry.handle.abort();
                self.stats.record_debounce_cancelled();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending update; returns how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingUpdate> = self.pending.lock().drain().map(|(_, v)| v).collect();
        for entry in &drained {
            entry.handle.abort();
            self.stats.record_debounce_cancelled();
        }
        drained.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn stats(&self) -> &Arc<ConcurrencyStats> {
        &self.stats
    }
}

impl<K> Drop for DebouncedUpdateQueue<K> {
    fn drop(&mut self) {
        for (_, entry) in self.pending.lock().drain() {
            entry.handle.abort();
        }
    }
}
