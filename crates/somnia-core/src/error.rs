//! Core error types for somnia-core.
//!
//! The taxonomy mirrors how each failure is treated by the callers:
//! storage and scheduler failures are non-fatal and mostly logged, while
//! session errors are surfaced so the UI can react to them.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for somnia-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable storage errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Sleep session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Notification scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable key/value storage failures.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open the backing database
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

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// The store refused the operation (in-memory stores, poisoned locks)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the sleep session tracker.
#[derive(Error, Debug)]
pub enum SessionError {
    /// `finish` was called with no session in progress
    #[error("No sleep session is in progress")]
    NoActiveSession,

    /// The wake time lies before the recorded start
    #[error("Invalid wake time: {wake_time} is before session start {started_at}")]
    InvalidWakeTime {
        started_at: DateTime<Utc>,
        wake_time: DateTime<Utc>,
    },

    /// A write the transition depends on failed; the transition did not happen
    #[error("Session state could not be persisted: {0}")]
    Storage(#[from] StorageError),
}

/// Platform notification scheduler failures.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Scheduling was rejected
    #[error("Failed to schedule notification: {0}")]
    ScheduleFailed(String),

    /// Cancellation was rejected
    #[error("Failed to cancel notification {platform_id}: {message}")]
    CancelFailed {
        platform_id: String,
        message: String,
    },

    /// Notifications are turned off in configuration
    #[error("Notifications are disabled")]
    Disabled,
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

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StorageError::Locked
                } else {
                    StorageError::QueryFailed(err.to_string())
                }
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for SchedulerError {
    fn from(err: rusqlite::Error) -> Self {
        SchedulerError::ScheduleFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
