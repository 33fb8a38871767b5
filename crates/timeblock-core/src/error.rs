//! Core error types for timeblock-core.
//!
//! Planning itself almost never fails: malformed tasks and blocks are
//! rejected individually and reported as [`PlanWarning`]s, and unsatisfiable
//! constraints surface as anomalies. The errors here cover programmer
//! mistakes at the public entry points, storage, and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for timeblock-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A collaborator (calendar source, store) refused or failed a request
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Stored payload could not be decoded
    #[error("Corrupt payload in {table}: {message}")]
    CorruptPayload { table: String, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDirUnavailable(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end_time ({end}) must be greater than start_time ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Duration that is zero or negative
    #[error("Invalid duration for '{id}': {minutes} minutes")]
    NonPositiveDuration { id: String, minutes: i64 },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Unknown reference
    #[error("Unknown {kind} '{id}'")]
    NotFound { kind: String, id: String },
}

/// Collaborator failures. The planner degrades on these instead of aborting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    /// Access to the collaborator was denied (e.g. calendar permission)
    #[error("Access denied by {collaborator}")]
    AccessDenied { collaborator: String },

    /// Collaborator could not be reached
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: String,
        message: String,
    },
}

/// A non-fatal problem found while planning.
///
/// Invalid inputs are dropped one at a time and recorded here so the caller
/// can show them next to the plan.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// Task rejected before placement
    InvalidTask { task_id: String, reason: String },
    /// Fixed block rejected before placement
    InvalidBlock { block_id: String, reason: String },
    /// Protected block overlapping an earlier protected block
    OverlappingFixedBlock { block_id: String, other_block_id: String },
    /// Task left out because the work-hours budget was exhausted
    DeferredByWorkHours { task_id: String },
    /// Collaborator failed; planning continued with empty input
    CollaboratorUnavailable { collaborator: String, reason: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_converts_into_core_error() {
        let err: CoreError = ValidationError::NonPositiveDuration {
            id: "t1".to_string(),
            minutes: 0,
        }
        .into();
        assert!(err.to_string().contains("t1"));
    }

    #[test]
    fn warning_serializes_with_kind_tag() {
        let warning = PlanWarning::DeferredByWorkHours {
            task_id: "t9".to_string(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "deferred_by_work_hours");
        assert_eq!(json["task_id"], "t9");
    }
}
