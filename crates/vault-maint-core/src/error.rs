use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Database {} is inaccessible: {source}", path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Integrity check failed: {0}")]
    IntegrityFailure(String),

    #[error("{operation} failed: {message}")]
    OperationFailure { operation: String, message: String },

    #[error("Backup failed: {0}")]
    BackupFailure(String),

    #[error("Invalid schedule '{expression}': {reason}")]
    ScheduleValidation { expression: String, reason: String },

    #[error("Another maintenance run holds the lock on {}", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
