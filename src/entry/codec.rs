//! Entry codec
//!
//! Maps a (key, value) pair to the hash fields stored under the key, and the
//! metadata fields back to [`KeyInfo`].

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{Result, StorageError};

use super::KeyInfo;

/// Raw value bytes
pub const FIELD_VALUE: &str = "value";

/// RFC3339 write timestamp
pub const FIELD_LAST_MODIFIED: &str = "last_modified";

/// Decimal byte length of the value
pub const FIELD_SIZE: &str = "size";

/// Fields read by stat, in reply order
pub const METADATA_FIELDS: [&str; 2] = [FIELD_LAST_MODIFIED, FIELD_SIZE];

// =============================================================================
// Encoding
// =============================================================================

/// Build the full field set for `value` written at `now`
pub fn encode_record(value: &[u8], now: DateTime<Utc>) -> Vec<(String, Bytes)> {
    vec![
        (FIELD_VALUE.to_string(), Bytes::copy_from_slice(value)),
        (
            FIELD_LAST_MODIFIED.to_string(),
            Bytes::from(format_timestamp(now)),
        ),
        (FIELD_SIZE.to_string(), Bytes::from(value.len().to_string())),
    ]
}

/// Format a timestamp as RFC3339 with second precision
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode the HMGET reply for [`METADATA_FIELDS`]
///
/// Both fields absent means the key does not exist. Anything else that is not
/// a well-formed pair is a malformed record.
pub fn decode_metadata(key: &str, fields: Vec<Option<Bytes>>) -> Result<KeyInfo> {
    if fields.len() != METADATA_FIELDS.len() {
        return Err(StorageError::malformed(
            key,
            format!(
                "expected {} metadata fields, got {}",
                METADATA_FIELDS.len(),
                fields.len()
            ),
        ));
    }

    let mut fields = fields.into_iter();
    let (last_modified, size) = match (fields.next().flatten(), fields.next().flatten()) {
        (None, None) => return Err(StorageError::NotFound(key.to_string())),
        (Some(last_modified), Some(size)) => (last_modified, size),
        (None, Some(_)) => {
            return Err(StorageError::malformed(
                key,
                format!("missing field '{}'", FIELD_LAST_MODIFIED),
            ))
        }
        (Some(_), None) => {
            return Err(StorageError::malformed(
                key,
                format!("missing field '{}'", FIELD_SIZE),
            ))
        }
    };

    Ok(KeyInfo {
        key: key.to_string(),
        modified: parse_timestamp(key, &last_modified)?,
        size: parse_size(key, &size)?,
        is_terminal: true,
    })
}

/// Parse the `last_modified` field
pub fn parse_timestamp(key: &str, raw: &[u8]) -> Result<DateTime<Utc>> {
    let text = field_str(key, FIELD_LAST_MODIFIED, raw)?;
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| {
            StorageError::malformed(
                key,
                format!("invalid {} '{}': {}", FIELD_LAST_MODIFIED, text, e),
            )
        })
}

/// Parse the `size` field
pub fn parse_size(key: &str, raw: &[u8]) -> Result<u64> {
    let text = field_str(key, FIELD_SIZE, raw)?;
    text.parse::<u64>().map_err(|e| {
        StorageError::malformed(key, format!("invalid {} '{}': {}", FIELD_SIZE, text, e))
    })
}

fn field_str<'a>(key: &str, field: &str, raw: &'a [u8]) -> Result<&'a str> {
    std::str::from_utf8(raw)
        .map_err(|_| StorageError::malformed(key, format!("field '{}' is not UTF-8", field)))
}
