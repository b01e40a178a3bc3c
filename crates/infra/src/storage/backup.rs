//! Backup file naming and discovery
//!
//! Backups are siblings of the data file (or live in the configured backup
//! directory) and are named `<stem>.backup-<timestamp>[-<tag>].<ext>`, where
//! the timestamp is UTC with millisecond precision. Tags mark why a backup
//! was taken, e.g. `rollback` for the safety copy made before a rollback.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";
const BACKUP_MARKER: &str = ".backup-";

/// A backup found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupFile {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub tag: Option<String>,
}

impl BackupFile {
    pub fn is_tagged(&self, tag: &str) -> bool {
        self.tag.as_deref() == Some(tag)
    }
}

fn split_name(data_path: &Path) -> (String, String) {
    let stem = data_path
        .file_stem()
        .map_or_else(|| "data".to_string(), |s| s.to_string_lossy().into_owned());
    let ext = data_path
        .extension()
        .map_or_else(|| "bak".to_string(), |s| s.to_string_lossy().into_owned());
    (stem, ext)
}

/// Directory backups of `data_path` are written to
pub fn backup_dir(data_path: &Path, configured: Option<&Path>) -> PathBuf {
    configured.map(Path::to_path_buf).unwrap_or_else(|| {
        data_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    })
}

/// Unused backup path for `data_path` at `at`
///
/// The timestamp is bumped by a millisecond while the name is taken.
pub fn next_backup_path(
    data_path: &Path,
    dir: &Path,
    at: DateTime<Utc>,
    tag: Option<&str>,
) -> PathBuf {
    let (stem, ext) = split_name(data_path);
    let mut at = at;
    loop {
        let timestamp = at.format(TIMESTAMP_FORMAT);
        let name = match tag {
            Some(tag) => format!("{stem}{BACKUP_MARKER}{timestamp}-{tag}.{ext}"),
            None => format!("{stem}{BACKUP_MARKER}{timestamp}.{ext}"),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        at += chrono::Duration::milliseconds(1);
    }
}

/// Parse a backup file name produced by [`next_backup_path`]
pub fn parse_backup_name(data_path: &Path, file_name: &str) -> Option<(DateTime<Utc>, Option<String>)> {
    let (stem, ext) = split_name(data_path);
    let rest = file_name.strip_prefix(&format!("{stem}{BACKUP_MARKER}"))?;
    let rest = rest.strip_suffix(&format!(".{ext}"))?;
    let (timestamp, tag) = match rest.split_once('-') {
        Some((timestamp, tag)) => (timestamp, Some(tag.to_string())),
        None => (rest, None),
    };
    let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
    Some((naive.and_utc(), tag))
}

/// Backups of `data_path` in `dir`, newest first
pub async fn list_backups(data_path: &Path, dir: &Path) -> std::io::Result<Vec<BackupFile>> {
    let mut backups = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(backups),
        Err(err) => return Err(err),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some((created_at, tag)) = parse_backup_name(data_path, &name.to_string_lossy()) else {
            continue;
        };
        backups.push(BackupFile { path: entry.path(), created_at, tag });
    }
    backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(backups)
}
