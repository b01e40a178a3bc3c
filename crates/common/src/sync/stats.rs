//! Concurrency statistics
//!
//! Atomic counters shared via `Arc` between guild locks, the transaction
//! runner, the debounced update queue and the retry wrapper. Relaxed ordering
//! is sufficient; counters are monotonic and read only for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide concurrency counters
#[derive(Debug, Default)]
pub struct ConcurrencyStats {
    lock_acquisitions: AtomicU64,
    lock_wait_ms_total: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    debounced_scheduled: AtomicU64,
    debounced_executed: AtomicU64,
    debounced_cancelled: AtomicU64,
    connections_opened: AtomicU64,
    retries: AtomicU64,
}

/// Point-in-time copy of [`ConcurrencyStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyStatsSnapshot {
    pub lock_acquisitions: u64,
    pub avg_lock_wait_ms: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
    pub debounced_scheduled: u64,
    pub debounced_executed: u64,
    pub debounced_cancelled: u64,
    pub connections_opened: u64,
    pub retries: u64,
}

impl ConcurrencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_lock_acquired(&self, wait_ms: u64) {
        self.lock_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.lock_wait_ms_total.fetch_add(wait_ms, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_debounce_scheduled(&self) {
        self.debounced_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_debounce_executed(&self) {
        self.debounced_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_debounce_cancelled(&self) {
        self.debounced_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConcurrencyStatsSnapshot {
        let acquisitions = self.lock_acquisitions.load(Ordering::Relaxed);
        let wait_total = self.lock_wait_ms_total.load(Ordering::Relaxed);
        ConcurrencyStatsSnapshot {
            lock_acquisitions: acquisitions,
            avg_lock_wait_ms: if acquisitions == 0 { 0 } else { wait_total / acquisitions },
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.transactions_rolled_back.load(Ordering::Relaxed),
            debounced_scheduled: self.debounced_scheduled.load(Ordering::Relaxed),
            debounced_executed: self.debounced_executed.load(Ordering::Relaxed),
            debounced_cancelled: self.debounced_cancelled.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}
