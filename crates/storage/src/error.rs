//! Storage error types.

use std::time::Duration;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// A staged object did not match what was written.
    #[error("Integrity check failed for {key}: {message}")]
    Integrity { key: String, message: String },

    #[error("Database error: {0}")]
    Database(String),

    /// Rows do not fit the destination table.
    #[error("Schema mismatch: {0}")]
    Schema(String),

    /// Partition writes did not finish in time and were rolled back.
    #[error("Partition write timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),
}
