//! Error types for store operations.

use std::io;
use thiserror::Error;

use crate::record::ResourceKind;

/// Result type for store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Encoding or decoding the persisted state failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// The persisted state is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Another transaction committed to the same partition after this one began.
    #[error("concurrent commit on partition {kind}")]
    Conflict {
        /// The contended partition.
        kind: ResourceKind,
    },

    /// A row with this key already exists.
    #[error("duplicate key in {table} for {kind}/{resource_id}")]
    DuplicateKey {
        /// Table name (`current` or `history`).
        table: &'static str,
        /// Partition.
        kind: ResourceKind,
        /// Conflicting resource id.
        resource_id: String,
    },

    /// The row targeted by an update does not exist.
    #[error("missing row in {table} for {kind}/{key}")]
    MissingRow {
        /// Table name (`current` or `history`).
        table: &'static str,
        /// Partition.
        kind: ResourceKind,
        /// Key that was looked up.
        key: String,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    Locked,
}

impl StorageError {
    /// Creates a codec error.
    pub fn codec(message: impl ToString) -> Self {
        Self::Codec(message.to_string())
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Returns true if retrying the whole transaction may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io(_) | StorageError::Conflict { .. })
    }
}
