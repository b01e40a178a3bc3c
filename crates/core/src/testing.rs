//! In-memory storage backend for unit and integration tests
//!
//! `MemoryBackend` keeps the document in a mutex. Each operation can be
//! switched into a failing state at any time to simulate an outage, and like
//! the SQLite backend it refuses reads and writes until it has been
//! initialized.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use reminder_domain::{ReminderError, Result, StorageDocument};

use crate::storage::{BackendKind, StorageBackend};

pub struct MemoryBackend {
    kind: BackendKind,
    document: Mutex<StorageDocument>,
    initialized: AtomicBool,
    pub fail_init: AtomicBool,
    pub fail_save: AtomicBool,
    pub fail_load: AtomicBool,
    pub init_calls: AtomicUsize,
    pub save_calls: AtomicUsize,
    pub cleanup_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            document: Mutex::new(StorageDocument::new()),
            initialized: AtomicBool::new(false),
            fail_init: AtomicBool::new(false),
            fail_save: AtomicBool::new(false),
            fail_load: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
            cleanup_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(kind: BackendKind) -> Self {
        let backend = Self::new(kind);
        backend.set_failing(true);
        backend
    }

    /// Toggle the simulated outage for every operation
    pub fn set_failing(&self, failing: bool) {
        self.fail_init.store(failing, Ordering::SeqCst);
        self.fail_save.store(failing, Ordering::SeqCst);
        self.fail_load.store(failing, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn document(&self) -> StorageDocument {
        self.document.lock().clone()
    }

    pub fn seed(&self, document: StorageDocument) {
        *self.document.lock() = document;
    }

    pub fn saves(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(ReminderError::Storage(format!("{} {op} failed", self.kind)));
        }
        if !self.is_initialized() {
            return Err(ReminderError::NotReady(format!("{} backend is not initialized", self.kind)));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn initialize(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(ReminderError::Storage(format!("{} initialize failed", self.kind)));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn save(&self, document: &StorageDocument) -> Result<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        self.check(&self.fail_save, "save")?;
        *self.document.lock() = document.clone();
        Ok(())
    }

    async fn load(&self) -> Result<StorageDocument> {
        self.check(&self.fail_load, "load")?;
        Ok(self.document())
    }

    async fn backup(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    async fn validate_integrity(&self) -> Result<bool> {
        Ok(self.is_initialized() && !self.fail_load.load(Ordering::SeqCst))
    }

    async fn cleanup(&self) -> Result<()> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
