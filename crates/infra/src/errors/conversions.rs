//! Conversions from external infrastructure errors into domain errors.

use reminder_common::storage::StorageError;
use reminder_common::{CommonError, ErrorClassification};
use reminder_domain::ReminderError;
use rusqlite::Error as SqlError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub ReminderError);

impl From<InfraError> for ReminderError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<ReminderError> for InfraError {
    fn from(value: ReminderError) -> Self {
        InfraError(value)
    }
}

trait IntoReminderError {
    fn into_reminder(self) -> ReminderError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → ReminderError */
/* -------------------------------------------------------------------------- */

impl IntoReminderError for SqlError {
    fn into_reminder(self) -> ReminderError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        ReminderError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        ReminderError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        ReminderError::Database(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 787) => ReminderError::Database(format!(
                        "foreign key constraint violation: {message}"
                    )),
                    (ErrorCode::ConstraintViolation, 275) => {
                        ReminderError::validation(format!("check constraint failed: {message}"))
                    }
                    (ErrorCode::NotADatabase, _) => {
                        ReminderError::Database("file is not a database".into())
                    }
                    _ => ReminderError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => ReminderError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                ReminderError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::IntegralValueOutOfRange(column, value) => ReminderError::Database(format!(
                "integer {value} in column {column} is out of range"
            )),
            RE::InvalidColumnType(_, _, ty) => {
                ReminderError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => ReminderError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => ReminderError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_reminder())
    }
}

/* -------------------------------------------------------------------------- */
/* StorageError → ReminderError */
/* -------------------------------------------------------------------------- */

impl IntoReminderError for StorageError {
    fn into_reminder(self) -> ReminderError {
        match self {
            StorageError::Rusqlite(err) => err.into_reminder(),
            StorageError::Io(err) => ReminderError::Io(err.to_string()),
            StorageError::SerdeJson(err) => ReminderError::Serialization(err.to_string()),
            StorageError::Common(CommonError::Validation { message, .. }) => {
                ReminderError::validation(message)
            }
            StorageError::Common(CommonError::NotFound { kind, id }) => {
                ReminderError::NotFound(format!("{kind} {id}"))
            }
            StorageError::Migration(message) => {
                ReminderError::Database(format!("migration failed: {message}"))
            }
            other if other.is_retryable() => {
                ReminderError::Database(format!("transient storage failure: {other}"))
            }
            other => ReminderError::Database(other.to_string()),
        }
    }
}

impl From<StorageError> for InfraError {
    fn from(value: StorageError) -> Self {
        InfraError(value.into_reminder())
    }
}

/* -------------------------------------------------------------------------- */
/* std / serde_json */
/* -------------------------------------------------------------------------- */

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        InfraError(ReminderError::Io(value.to_string()))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(ReminderError::Serialization(value.to_string()))
    }
}

/// Blocking task panicked or was cancelled
pub fn map_join_error(err: JoinError) -> ReminderError {
    if err.is_cancelled() {
        ReminderError::Internal("blocking task cancelled".into())
    } else {
        ReminderError::Internal(format!("blocking task panicked: {err}"))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
