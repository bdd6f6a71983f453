//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A log line or document could not be (de)serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store contents are corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The store is closed.
    #[error("storage is closed")]
    Closed,

    /// The store refused the write.
    #[error("write rejected: {0}")]
    WriteRejected(String),
}
