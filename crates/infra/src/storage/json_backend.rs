//! Flat-file JSON backend
//!
//! The whole document lives in one JSON object keyed by message id. Saves
//! write a `.tmp` sibling and rename it over the data file, so readers never
//! see a half-written document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use reminder_core::storage::{BackendKind, StorageBackend};
use reminder_domain::{ReminderError, Result, StorageConfig, StorageDocument};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::backup::{self, BackupFile};
use crate::errors::InfraError;

/// JSON flat-file [`StorageBackend`]
pub struct JsonStorageBackend {
    path: PathBuf,
    backup_dir: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl JsonStorageBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), backup_dir: None, write_lock: Mutex::new(()) }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.json_path).with_backup_dir(config.backup_dir.clone())
    }

    pub fn with_backup_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.backup_dir = dir;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> PathBuf {
        backup::backup_dir(&self.path, self.backup_dir.as_deref())
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Raw JSON value of the data file; `None` when it does not exist
    pub async fn read_raw(&self) -> Result<Option<Value>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(InfraError::from(err).into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Some(Value::Object(serde_json::Map::new())));
        }
        let value = serde_json::from_slice(&bytes).map_err(InfraError::from)?;
        Ok(Some(value))
    }

    /// Copy the data file aside with an optional tag in its name
    pub async fn backup_tagged(&self, tag: Option<&str>) -> Result<Option<PathBuf>> {
        if !self.exists().await {
            debug!(path = %self.path.display(), "No JSON file to back up");
            return Ok(None);
        }
        let dir = self.backup_dir();
        fs::create_dir_all(&dir).await.map_err(InfraError::from)?;
        let target = backup::next_backup_path(&self.path, &dir, Utc::now(), tag);

        let _guard = self.write_lock.lock().await;
        fs::copy(&self.path, &target).await.map_err(InfraError::from)?;
        info!(backup = %target.display(), "JSON backup written");
        Ok(Some(target))
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupFile>> {
        Ok(backup::list_backups(&self.path, &self.backup_dir()).await.map_err(InfraError::from)?)
    }

    /// Replace the data file with the contents of `source`
    ///
    /// `source` must decode as a document; the data file is left untouched
    /// otherwise.
    pub async fn restore_from(&self, source: &Path) -> Result<StorageDocument> {
        let bytes = fs::read(source).await.map_err(InfraError::from)?;
        let value: Value = serde_json::from_slice(&bytes).map_err(InfraError::from)?;
        let document = StorageDocument::from_flat_json(&value)?;

        let _guard = self.write_lock.lock().await;
        self.write_atomically(&bytes).await?;
        info!(source = %source.display(), events = document.len(), "JSON file restored");
        Ok(document)
    }

    /// Move the data file aside once its contents live elsewhere
    pub async fn archive(&self) -> Result<Option<PathBuf>> {
        if !self.exists().await {
            return Ok(None);
        }
        let target = backup::next_backup_path(&self.path, &self.backup_dir(), Utc::now(), Some("archived"));
        let _guard = self.write_lock.lock().await;
        fs::rename(&self.path, &target).await.map_err(InfraError::from)?;
        info!(archive = %target.display(), "JSON file archived");
        Ok(Some(target))
    }

    async fn write_atomically(&self, bytes: &[u8]) -> Result<()> {
        let temp_path = self.path.with_extension("tmp");
        if let Some(parent) = temp_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(InfraError::from)?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await
            .map_err(InfraError::from)?;
        file.write_all(bytes).await.map_err(InfraError::from)?;
        file.sync_all().await.map_err(InfraError::from)?;
        drop(file);

        fs::rename(&temp_path, &self.path).await.map_err(InfraError::from)?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for JsonStorageBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Json
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn initialize(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(InfraError::from)?;
        }
        let present = self.exists().await;
        info!(present, "JSON backend ready");
        Ok(())
    }

    async fn save(&self, document: &StorageDocument) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&document.to_flat_json()?)?;
        let _guard = self.write_lock.lock().await;
        self.write_atomically(&bytes).await?;
        debug!(events = document.len(), bytes = bytes.len(), "JSON document saved");
        Ok(())
    }

    async fn load(&self) -> Result<StorageDocument> {
        match self.read_raw().await? {
            Some(value) => StorageDocument::from_flat_json(&value),
            None => Ok(StorageDocument::new()),
        }
    }

    async fn backup(&self) -> Result<Option<PathBuf>> {
        self.backup_tagged(None).await
    }

    async fn validate_integrity(&self) -> Result<bool> {
        let value = match self.read_raw().await {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(true),
            Err(ReminderError::Serialization(message)) => {
                warn!(%message, "JSON file does not parse");
                return Ok(false);
            }
            Err(err) => return Err(err),
        };
        match StorageDocument::from_flat_json(&value) {
            Ok(document) => {
                let problems = document.validation_errors(false);
                if problems.is_empty() {
                    Ok(true)
                } else {
                    warn!(count = problems.len(), first = %problems[0], "JSON records violate invariants");
                    Ok(false)
                }
            }
            Err(err) => {
                warn!(error = %err, "JSON records do not decode");
                Ok(false)
            }
        }
    }

    async fn cleanup(&self) -> Result<()> {
        // Serialise with any in-flight write before reporting clean.
        let _guard = self.write_lock.lock().await;
        Ok(())
    }
}
