//! Error types for the storage layer.

use rows_core::PersistenceError;
use thiserror::Error;

/// Errors from `SQLite` storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Convert into the collaborator error reported to the core.
    pub fn into_persistence(self, operation: &'static str) -> PersistenceError {
        PersistenceError::new(operation, self)
    }
}
