//! Entry Module
//!
//! Stored objects and their metadata.
//!
//! ## Record Layout
//! Every entry key holds one hash with three fields, written together by a
//! single HSET:
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ key: "certificates/acme/example.com/example.com.crt" │
//! ├───────────────┬──────────────────────────────────────┤
//! │ value         │ raw bytes                            │
//! │ last_modified │ "2024-05-01T12:00:00Z"  (RFC3339)    │
//! │ size          │ "1834"                  (decimal)    │
//! └───────────────┴──────────────────────────────────────┘
//! ```

mod codec;
mod store;

use chrono::{DateTime, Utc};

pub use codec::{
    decode_metadata, encode_record, format_timestamp, parse_size, parse_timestamp,
    FIELD_LAST_MODIFIED, FIELD_SIZE, FIELD_VALUE, METADATA_FIELDS,
};
pub use store::EntryStore;

/// Metadata for one stored key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// The key itself
    pub key: String,

    /// When the value was last written
    pub modified: DateTime<Utc>,

    /// Value length in bytes
    pub size: u64,

    /// Always true: only leaf objects are stored, directories are synthesized
    pub is_terminal: bool,
}
