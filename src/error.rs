//! Error types for the persistence collaborator.
//!
//! Every other degradation (missing fields, thin history, malformed amounts,
//! embedding dimension mismatches) is recovered where it happens. A store that
//! cannot be read or written is the only failure that propagates out of scoring.

use thiserror::Error;

/// Result type alias using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by an `InvoiceStore` backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite backend failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure while opening the store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A writer panicked while holding the store lock.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    /// A persisted value could not be decoded.
    #[error("invalid stored value: {0}")]
    InvalidDbValue(String),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        StoreError::LockPoisoned(err.to_string())
    }
}
