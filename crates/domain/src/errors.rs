//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the reminder storage layer
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ReminderError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Both the primary and the fallback backend failed
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReminderError {
    /// Single-message validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Validation messages carried by this error, if any
    pub fn validation_errors(&self) -> &[String] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for ReminderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ReminderError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type alias for reminder operations
pub type Result<T> = std::result::Result<T, ReminderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_joins_messages() {
        let err = ReminderError::Validation(vec![
            "event 1: interval_minutes must be > 0".to_string(),
            "event 2: required_reactions is empty".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: event 1: interval_minutes must be > 0; event 2: required_reactions is empty"
        );
        assert_eq!(err.validation_errors().len(), 2);
    }

    #[test]
    fn serializes_with_type_tag() {
        let err = ReminderError::NotFound("event 100".to_string());
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["type"], "NotFound");
        assert_eq!(json["message"], "event 100");
    }
}
