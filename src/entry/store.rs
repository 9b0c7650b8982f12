//! Entry store
//!
//! Store, load, delete, exists and stat over entry records.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use crate::backend::Dispatcher;
use crate::context::Context;
use crate::error::{Result, StorageError};
use crate::protocol::Command;

use super::codec::{decode_metadata, encode_record, FIELD_VALUE, METADATA_FIELDS};
use super::KeyInfo;

/// Record-level operations on single keys
pub struct EntryStore {
    dispatcher: Arc<Dispatcher>,
}

impl EntryStore {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Write `value` with fresh metadata (upsert)
    ///
    /// All three fields go out in one HSET, so readers never see a value
    /// paired with the previous write's metadata.
    pub async fn store(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
        let command = Command::HSet {
            key: key.to_string(),
            fields: encode_record(value, Utc::now()),
        };
        self.dispatcher.call(ctx, command).await?;
        tracing::debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Read the value bytes only
    ///
    /// Returns [`StorageError::NotFound`] if the key or its value field is absent.
    pub async fn load(&self, ctx: &Context, key: &str) -> Result<Bytes> {
        let command = Command::HGet {
            key: key.to_string(),
            field: FIELD_VALUE.to_string(),
        };
        self.dispatcher
            .call(ctx, command)
            .await?
            .into_bulk()?
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    /// Remove the key; missing keys are not an error
    pub async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        let command = Command::Del {
            key: key.to_string(),
        };
        let removed = self.dispatcher.call(ctx, command).await?.into_integer()?;
        tracing::debug!("Deleted {} (removed={})", key, removed);
        Ok(())
    }

    /// Probe for the key
    ///
    /// Any failure reads as "absent": callers cannot tell absent from unknown
    /// anyway, so errors are logged and swallowed.
    pub async fn exists(&self, ctx: &Context, key: &str) -> bool {
        let command = Command::Exists {
            key: key.to_string(),
        };
        match self.dispatcher.call(ctx, command).await.and_then(|r| r.into_integer()) {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::debug!("Exists check for {} failed, reporting absent: {}", key, e);
                false
            }
        }
    }

    /// Read last-modified and size
    pub async fn stat(&self, ctx: &Context, key: &str) -> Result<KeyInfo> {
        let command = Command::HMGet {
            key: key.to_string(),
            fields: METADATA_FIELDS.iter().map(|f| f.to_string()).collect(),
        };
        let fields = self.dispatcher.call(ctx, command).await?.into_array()?;
        decode_metadata(key, fields)
    }
}
