//! Configuration for certkv
//!
//! Centralized configuration with sensible defaults.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::Route;
use crate::error::{Result, StorageError};
use crate::protocol::Command;

/// Main configuration for a storage instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Lock Configuration
    // -------------------------------------------------------------------------
    /// Number of lock nodes that must acknowledge an acquisition (>= 1)
    pub lock_quorum: usize,

    /// Prefix for lock keys in the backing store
    /// Lock for "foo" lives at `{lock_key_prefix}:foo`
    pub lock_key_prefix: String,

    /// Extra acquisition rounds after the first failed one
    pub lock_retry_attempts: u32,

    /// Pause between acquisition rounds (milliseconds)
    pub lock_retry_delay_ms: u64,

    /// How long a lock key lives on a node without renewal (milliseconds)
    ///
    /// A held lease is extended every half validity, so it only lapses when
    /// its holder stops renewing it (crash, partition).
    pub lock_validity_ms: u64,

    // -------------------------------------------------------------------------
    // Listing Configuration
    // -------------------------------------------------------------------------
    /// Keys examined per SCAN round
    ///
    /// Servers default to 10, which makes listing a large certificate
    /// namespace slow. Raising it cuts round trips.
    pub scan_count: usize,

    // -------------------------------------------------------------------------
    // Client Configuration
    // -------------------------------------------------------------------------
    /// Which commands may be served by a replica
    pub replica_routing: ReplicaRouting,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_quorum: 2,
            lock_key_prefix: "certlock".to_string(),
            lock_retry_attempts: 0,
            lock_retry_delay_ms: 100,
            lock_validity_ms: 5000,
            scan_count: 50,
            replica_routing: ReplicaRouting::None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check value constraints
    pub fn validate(&self) -> Result<()> {
        if self.lock_quorum < 1 {
            return Err(StorageError::Config(
                "lock_quorum must be at least 1".to_string(),
            ));
        }
        if self.scan_count < 1 {
            return Err(StorageError::Config(
                "scan_count must be at least 1".to_string(),
            ));
        }
        if self.lock_validity_ms < 1 {
            return Err(StorageError::Config(
                "lock_validity_ms must be at least 1".to_string(),
            ));
        }
        if self.lock_key_prefix.is_empty() {
            return Err(StorageError::Config(
                "lock_key_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Pause between lock acquisition rounds
    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }

    /// Lifetime of an unrenewed lock key
    pub fn lock_validity(&self) -> Duration {
        Duration::from_millis(self.lock_validity_ms)
    }
}

/// Replica routing policy, chosen once per client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicaRouting {
    /// Everything goes to the primary
    #[default]
    #[serde(rename = "none")]
    None,

    /// Read-only commands may be served by a replica
    #[serde(rename = "readonly")]
    ReadOnlyToReplica,
}

impl ReplicaRouting {
    /// Decide where a command is sent
    pub fn route(self, command: &Command) -> Route {
        match self {
            ReplicaRouting::None => Route::Primary,
            ReplicaRouting::ReadOnlyToReplica if command.is_read_only() => Route::Replica,
            ReplicaRouting::ReadOnlyToReplica => Route::Primary,
        }
    }
}

impl FromStr for ReplicaRouting {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "none" => Ok(ReplicaRouting::None),
            "readonly" => Ok(ReplicaRouting::ReadOnlyToReplica),
            other => Err(StorageError::Config(format!(
                "invalid replica routing '{}' (expected 'none' or 'readonly')",
                other
            ))),
        }
    }
}

impl fmt::Display for ReplicaRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaRouting::None => f.write_str("none"),
            ReplicaRouting::ReadOnlyToReplica => f.write_str("readonly"),
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the lock acknowledgement quorum
    pub fn lock_quorum(mut self, quorum: usize) -> Self {
        self.config.lock_quorum = quorum;
        self
    }

    /// Set the lock key prefix
    pub fn lock_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.lock_key_prefix = prefix.into();
        self
    }

    /// Set the number of extra acquisition rounds
    pub fn lock_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.lock_retry_attempts = attempts;
        self
    }

    /// Set the pause between acquisition rounds (in milliseconds)
    pub fn lock_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.lock_retry_delay_ms = ms;
        self
    }

    /// Set the lock key validity (in milliseconds)
    pub fn lock_validity_ms(mut self, ms: u64) -> Self {
        self.config.lock_validity_ms = ms;
        self
    }

    /// Set the SCAN batch size
    pub fn scan_count(mut self, count: usize) -> Self {
        self.config.scan_count = count;
        self
    }

    /// Set the replica routing policy
    pub fn replica_routing(mut self, routing: ReplicaRouting) -> Self {
        self.config.replica_routing = routing;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
