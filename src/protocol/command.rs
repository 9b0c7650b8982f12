//! Command definitions
//!
//! Represents requests sent to the backing store.

use std::time::Duration;

use bytes::Bytes;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    HSet,
    HGet,
    HMGet,
    Del,
    Exists,
    Scan,
    SetNx,
    DelIfEq,
    ExpireIfEq,
}

impl CommandType {
    /// Upper-case command name, for logging
    pub fn name(self) -> &'static str {
        match self {
            CommandType::HSet => "HSET",
            CommandType::HGet => "HGET",
            CommandType::HMGet => "HMGET",
            CommandType::Del => "DEL",
            CommandType::Exists => "EXISTS",
            CommandType::Scan => "SCAN",
            CommandType::SetNx => "SETNX",
            CommandType::DelIfEq => "DELIFEQ",
            CommandType::ExpireIfEq => "PEXPIREIFEQ",
        }
    }
}

/// A store command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set all given hash fields on `key` in one atomic step
    HSet {
        key: String,
        fields: Vec<(String, Bytes)>,
    },

    /// Read one hash field
    HGet { key: String, field: String },

    /// Read several hash fields, in order
    HMGet { key: String, fields: Vec<String> },

    /// Delete a key of any type
    Del { key: String },

    /// Check whether a key exists
    Exists { key: String },

    /// One round of cursor-based iteration
    Scan {
        cursor: u64,
        pattern: String,
        count: usize,
    },

    /// Set a string key only if it does not exist yet, expiring after `ttl`
    /// when one is given
    SetNx {
        key: String,
        value: Bytes,
        ttl: Option<Duration>,
    },

    /// Delete a string key only if its value equals `value`
    DelIfEq { key: String, value: Bytes },

    /// Reset the expiry of a string key to `ttl`, only if its value equals
    /// `value`
    ExpireIfEq {
        key: String,
        value: Bytes,
        ttl: Duration,
    },
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::HSet { .. } => CommandType::HSet,
            Command::HGet { .. } => CommandType::HGet,
            Command::HMGet { .. } => CommandType::HMGet,
            Command::Del { .. } => CommandType::Del,
            Command::Exists { .. } => CommandType::Exists,
            Command::Scan { .. } => CommandType::Scan,
            Command::SetNx { .. } => CommandType::SetNx,
            Command::DelIfEq { .. } => CommandType::DelIfEq,
            Command::ExpireIfEq { .. } => CommandType::ExpireIfEq,
        }
    }

    /// Whether the command leaves the keyspace untouched
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Command::HGet { .. } | Command::HMGet { .. } | Command::Exists { .. } | Command::Scan { .. }
        )
    }

    /// The key the command addresses (SCAN has none)
    pub fn key(&self) -> Option<&str> {
        match self {
            Command::HSet { key, .. }
            | Command::HGet { key, .. }
            | Command::HMGet { key, .. }
            | Command::Del { key }
            | Command::Exists { key }
            | Command::SetNx { key, .. }
            | Command::DelIfEq { key, .. }
            | Command::ExpireIfEq { key, .. } => Some(key),
            Command::Scan { .. } => None,
        }
    }
}
