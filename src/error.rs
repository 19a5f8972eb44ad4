use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

use crate::migration::executor::ErrorCode;

#[derive(Error, Debug)]
pub enum WashDeskError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error), // Converts io::Error into WashDeskError automatically

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError), // Converts rusqlite::Error automatically

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Backup capture or write failed. Nothing has been mutated yet.
    #[error("Backup failed: {0}")]
    StorageError(String),

    #[error("Statement failed [{code}]: {source} ({statement})")]
    ExecutionError {
        code: ErrorCode,
        statement: String,
        #[source]
        source: RusqliteError,
    },

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Failed to restore table '{table}': {message}")]
    RestoreError { table: String, message: String },

    #[error("Failed to write activity log: {0}")]
    LogError(String),

    #[error("Access denied: employee {0} is not an active administrator")]
    AccessDenied(i64),

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}
