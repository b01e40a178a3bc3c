//! Errors raised by the SQLite pool and the code that runs on its connections

use std::time::Duration;

use thiserror::Error;

use crate::error::{CommonError, ErrorClassification, ErrorSeverity};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot reach database: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("no connection available within {0:?}")]
    Timeout(Duration),

    #[error("migration failed: {0}")]
    Migration(String),

    /// The database was written by a newer build
    #[error("database schema is v{found}, this build knows up to v{expected}")]
    SchemaVersionMismatch { expected: u32, found: u32 },

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// SQLITE_BUSY and SQLITE_LOCKED clear up once the other writer finishes
fn is_busy_or_locked(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

impl ErrorClassification for StorageError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Rusqlite(err) => is_busy_or_locked(err),
            Self::Common(err) => err.is_retryable(),
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Rusqlite(err) if is_busy_or_locked(err) => ErrorSeverity::Warning,
            Self::Migration(_) | Self::SchemaVersionMismatch { .. } | Self::Integrity(_) => {
                ErrorSeverity::Critical
            }
            Self::Common(err) => err.severity(),
            _ => ErrorSeverity::Error,
        }
    }
}

impl From<StorageError> for CommonError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Common(inner) => inner,
            other if other.is_retryable() => CommonError::backend("sqlite", other.to_string(), true),
            other => CommonError::storage_op("sqlite", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn busy_database_is_retryable_constraint_is_not() {
        assert!(StorageError::Rusqlite(sqlite_failure(rusqlite::ffi::SQLITE_BUSY)).is_retryable());
        assert!(!StorageError::Rusqlite(sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT))
            .is_retryable());
        assert!(StorageError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!StorageError::Integrity("orphan reaction".into()).is_retryable());
    }

    /// Tests that schema problems are critical and contention only warns
    #[test]
    fn severity_mapping() {
        let newer = StorageError::SchemaVersionMismatch { expected: 3, found: 4 };
        assert!(newer.is_critical());
        assert_eq!(newer.to_string(), "database schema is v4, this build knows up to v3");
        assert_eq!(
            StorageError::Rusqlite(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED)).severity(),
            ErrorSeverity::Warning
        );
    }

    #[test]
    fn conversion_to_common_keeps_retryability() {
        let busy: CommonError = StorageError::Timeout(Duration::from_millis(200)).into();
        assert!(busy.is_retryable());

        let broken: CommonError = StorageError::Query("syntax error".into()).into();
        assert!(!broken.is_retryable());
        assert!(broken.to_string().contains("syntax error"));
    }
}
