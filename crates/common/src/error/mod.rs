//! Shared error vocabulary for the reminder crates
//!
//! [`CommonError`] holds the failure shapes that more than one crate needs
//! (guild lock contention, a busy backend, a snowflake that fails validation).
//! Crate-level errors wrap it with `#[from]` instead of re-declaring them, and
//! everything implements [`ErrorClassification`] so the retry executor can
//! decide whether another attempt is worthwhile.
//!
//! | Variant | Retryable |
//! |---------|-----------|
//! | `Lock`, `Timeout` | yes |
//! | `Backend` | when flagged |
//! | everything else | no |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Clone, Error)]
pub enum CommonError {
    #[error("lock on '{resource}' failed: {message}")]
    Lock { resource: String, message: String },

    #[error("'{operation}' timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    /// A storage backend reported a failure; `retryable` is the backend's
    /// own judgement
    #[error("{backend} backend: {message}")]
    Backend { backend: String, message: String, retryable: bool },

    #[error("{format} encoding failed: {message}")]
    Serialization { format: &'static str, message: String },

    /// File-level I/O outside the database
    #[error("file I/O failed: {0}")]
    Persistence(String),

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    #[error("storage operation '{operation}' failed: {message}")]
    Storage { operation: String, message: String },

    #[error("internal error in {context}: {message}")]
    Internal { context: String, message: String },
}

impl CommonError {
    pub fn lock_resource(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Lock { resource: resource.into(), message: message.into() }
    }

    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    pub fn backend(backend: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Backend { backend: backend.into(), message: message.into(), retryable }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn not_found(kind: impl Into<String>, id: impl fmt::Display) -> Self {
        Self::NotFound { kind: kind.into(), id: id.to_string() }
    }

    pub fn storage_op(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage { operation: operation.into(), message: message.into() }
    }

    pub fn internal_ctx(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Internal { context: context.into(), message: message.into() }
    }
}

/// Lets retry and logging code treat every error type in the workspace the
/// same way
pub trait ErrorClassification {
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Minimum delay before the next attempt, when the error dictates one
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Lock { .. } | Self::Timeout { .. } => true,
            Self::Backend { retryable, .. } => *retryable,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound { .. } => ErrorSeverity::Info,
            Self::Lock { .. } | Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Internal { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization { format: "JSON", message: err.to_string() }
    }
}

impl From<std::io::Error> for CommonError {
    fn from(err: std::io::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_is_retryable_validation_is_not() {
        assert!(CommonError::lock_resource("guild:1", "contended").is_retryable());
        assert!(CommonError::timeout("save", Duration::from_secs(1)).is_retryable());
        assert!(!CommonError::validation("interval_minutes", "must be positive").is_retryable());
    }

    #[test]
    fn backend_retryability_follows_flag() {
        assert!(CommonError::backend("sqlite", "busy", true).is_retryable());
        assert!(!CommonError::backend("sqlite", "corrupt", false).is_retryable());
    }

    #[test]
    fn internal_errors_are_critical() {
        let err = CommonError::internal_ctx("adapter", "no backend");
        assert!(err.is_critical());
        assert_eq!(err.to_string(), "internal error in adapter: no backend");
    }

    #[test]
    fn messages_carry_context() {
        assert_eq!(
            CommonError::storage_op("event.save", "disk full").to_string(),
            "storage operation 'event.save' failed: disk full"
        );
        assert_eq!(CommonError::not_found("event", 100).to_string(), "event '100' not found");
    }

    #[test]
    fn severity_ordering() {
        assert!(ErrorSeverity::Critical > ErrorSeverity::Error);
        assert!(ErrorSeverity::Warning > ErrorSeverity::Info);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }
}
