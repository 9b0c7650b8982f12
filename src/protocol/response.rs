//! Reply definitions
//!
//! Represents answers from the backing store.

use bytes::Bytes;

use crate::error::{Result, StorageError};

/// A reply from the backing store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Plain acknowledgement
    Ok,

    /// Integer reply (counts, booleans)
    Integer(i64),

    /// Single value, `None` when the key or field is absent
    Bulk(Option<Bytes>),

    /// Multiple values, one slot per requested field
    Array(Vec<Option<Bytes>>),

    /// One SCAN round: continuation cursor and matched keys
    Scan { cursor: u64, keys: Vec<String> },
}

impl Reply {
    /// Short name of the reply shape, for error messages
    fn kind(&self) -> &'static str {
        match self {
            Reply::Ok => "ok",
            Reply::Integer(_) => "integer",
            Reply::Bulk(_) => "bulk",
            Reply::Array(_) => "array",
            Reply::Scan { .. } => "scan",
        }
    }

    fn unexpected(self, expected: &str) -> StorageError {
        StorageError::Backend(format!(
            "unexpected {} reply (expected {})",
            self.kind(),
            expected
        ))
    }

    /// Interpret as an integer
    pub fn into_integer(self) -> Result<i64> {
        match self {
            Reply::Integer(n) => Ok(n),
            other => Err(other.unexpected("integer")),
        }
    }

    /// Interpret as a single optional value
    pub fn into_bulk(self) -> Result<Option<Bytes>> {
        match self {
            Reply::Bulk(value) => Ok(value),
            other => Err(other.unexpected("bulk")),
        }
    }

    /// Interpret as a list of optional values
    pub fn into_array(self) -> Result<Vec<Option<Bytes>>> {
        match self {
            Reply::Array(values) => Ok(values),
            other => Err(other.unexpected("array")),
        }
    }

    /// Interpret as one SCAN round
    pub fn into_scan(self) -> Result<(u64, Vec<String>)> {
        match self {
            Reply::Scan { cursor, keys } => Ok((cursor, keys)),
            other => Err(other.unexpected("scan")),
        }
    }
}
