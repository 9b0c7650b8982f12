//! Error types for certkv
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using StorageError
pub type Result<T> = std::result::Result<T, StorageError>;

/// Unified error type for certkv operations
#[derive(Debug, Error)]
pub enum StorageError {
    // -------------------------------------------------------------------------
    // Entry Errors
    // -------------------------------------------------------------------------
    /// The key (or its record fields) does not exist. Callers treat this as
    /// "nothing stored yet", not as a fault.
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Malformed record for key '{key}': {reason}")]
    MalformedRecord { key: String, reason: String },

    // -------------------------------------------------------------------------
    // Lock Errors
    // -------------------------------------------------------------------------
    #[error("Lock already held locally: {0}")]
    AlreadyHeld(String),

    #[error("Lock not held locally: {0}")]
    NotHeld(String),

    #[error("Lock quorum not reached for '{name}': {acquired} of {required} nodes acknowledged")]
    QuorumNotReached {
        name: String,
        acquired: usize,
        required: usize,
    },

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The storage instance was closed
    #[error("Storage is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether this error means the key is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Whether this error came from a fired cancellation token or deadline
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StorageError::Cancelled(_))
    }

    pub(crate) fn malformed(key: &str, reason: impl Into<String>) -> Self {
        StorageError::MalformedRecord {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
