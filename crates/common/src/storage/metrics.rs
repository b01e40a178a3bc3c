//! Connection pool counters and health snapshots

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lock-free counters updated on every pool checkout
#[derive(Debug, Default)]
pub struct PoolStats {
    acquired: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
    wait_micros: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_acquired(&self, waited: Duration) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(waited.as_micros()).unwrap_or(u64::MAX);
        self.wait_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolMetrics {
        let acquired = self.acquired.load(Ordering::Relaxed);
        let wait = self.wait_micros.load(Ordering::Relaxed);
        PoolMetrics {
            connections_acquired: acquired,
            connection_timeouts: self.timeouts.load(Ordering::Relaxed),
            connection_errors: self.errors.load(Ordering::Relaxed),
            avg_wait_micros: wait.checked_div(acquired).unwrap_or(0),
        }
    }
}

/// Point-in-time copy of [`PoolStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub connections_acquired: u64,
    pub connection_timeouts: u64,
    pub connection_errors: u64,
    pub avg_wait_micros: u64,
}

/// Result of a pool health probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolHealth {
    pub healthy: bool,
    pub open_connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
