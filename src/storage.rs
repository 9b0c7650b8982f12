//! Storage facade
//!
//! Composes the entry store, lister and lock coordinator behind the single
//! contract the certificate manager consumes.
//!
//! ## Responsibilities
//! - Validate configuration and wire components to the shared client
//! - Route data operations to [`EntryStore`] / [`Lister`]
//! - Route mutual exclusion to [`LockCoordinator`]
//! - Drain locks and release connections on close

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::backend::{
    Dispatcher, DistributedLocker, KvClient, MemoryClient, MemoryNode, QuorumLocker,
};
use crate::config::Config;
use crate::context::Context;
use crate::entry::{EntryStore, KeyInfo};
use crate::error::{Result, StorageError};
use crate::listing::Lister;
use crate::lock::LockCoordinator;

/// Storage contract consumed by the certificate manager
///
/// `NotFound` from `load`/`stat` is an expected condition ("nothing stored
/// yet"), check it with [`StorageError::is_not_found`].
#[async_trait]
pub trait CertStorage: Send + Sync {
    /// Write `value` under `key`, replacing any previous value
    async fn store(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()>;

    /// Read the value under `key`
    async fn load(&self, ctx: &Context, key: &str) -> Result<Bytes>;

    /// Remove `key`; removing a missing key succeeds
    async fn delete(&self, ctx: &Context, key: &str) -> Result<()>;

    /// Whether `key` exists; backend failures read as `false`
    async fn exists(&self, ctx: &Context, key: &str) -> bool;

    /// Keys under `prefix`, recursively or as immediate children
    ///
    /// Lock keys (`<lock_key_prefix>:<name>`) are never listed, even when
    /// they live on the data node.
    async fn list(&self, ctx: &Context, prefix: &str, recursive: bool) -> Result<Vec<String>>;

    /// Metadata for `key`
    async fn stat(&self, ctx: &Context, key: &str) -> Result<KeyInfo>;

    /// Acquire the cluster-wide lock `name`
    ///
    /// Fails with [`StorageError::Closed`] once `close` has begun.
    async fn lock(&self, ctx: &Context, name: &str) -> Result<()>;

    /// Release the lock `name` held by this instance
    async fn unlock(&self, name: &str) -> Result<()>;

    /// Wait for in-flight lock acquisitions, release all held locks, then
    /// close the backend connections
    async fn close(&self) -> Result<()>;
}

/// Storage instance over a key-value client and a distributed locker
///
/// ## Concurrency
/// All methods take `&self`; share the instance with `Arc` across tasks.
/// The client and locker are owned by this instance and closed by
/// [`CertStorage::close`].
pub struct Storage {
    /// Storage configuration
    config: Config,

    /// Shared key-value client (closed on close)
    client: Arc<dyn KvClient>,

    /// Shared lock primitive (closed on close)
    locker: Arc<dyn DistributedLocker>,

    /// Record operations
    entries: EntryStore,

    /// Directory emulation
    lister: Lister,

    /// Local lock registry
    locks: LockCoordinator,

    /// Set by the first close
    closed: AtomicBool,
}

impl Storage {
    /// Build a storage instance from connected collaborators
    pub fn open(
        config: Config,
        client: Arc<dyn KvClient>,
        locker: Arc<dyn DistributedLocker>,
    ) -> Result<Self> {
        config.validate()?;

        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&client), config.replica_routing));

        tracing::info!(
            "Opened storage (lock_quorum={}, scan_count={}, replica_routing={})",
            config.lock_quorum,
            config.scan_count,
            config.replica_routing
        );

        Ok(Self {
            entries: EntryStore::new(Arc::clone(&dispatcher)),
            lister: Lister::new(dispatcher, config.scan_count)
                .hiding(format!("{}:", config.lock_key_prefix)),
            locks: LockCoordinator::new(Arc::clone(&locker)),
            config,
            client,
            locker,
            closed: AtomicBool::new(false),
        })
    }

    /// Open over in-memory nodes (convenience method)
    ///
    /// Data goes to the first node; every node takes part in locking.
    pub fn open_in_memory(config: Config, nodes: &[Arc<MemoryNode>]) -> Result<Self> {
        let Some(primary) = nodes.first() else {
            return Err(StorageError::Config(
                "at least one memory node is required".to_string(),
            ));
        };

        let client: Arc<dyn KvClient> = Arc::new(MemoryClient::new(Arc::clone(primary)));
        let lock_nodes: Vec<Arc<dyn KvClient>> = nodes
            .iter()
            .map(|node| Arc::new(MemoryClient::new(Arc::clone(node))) as Arc<dyn KvClient>)
            .collect();
        let locker: Arc<dyn DistributedLocker> = Arc::new(QuorumLocker::new(lock_nodes, &config)?);

        Self::open(config, client, locker)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether this instance holds lock `name`
    pub fn is_locked(&self, name: &str) -> bool {
        self.locks.is_held(name)
    }

    /// Names of the locks this instance holds
    pub fn held_locks(&self) -> Vec<String> {
        self.locks.held_names()
    }

    /// Whether close has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CertStorage for Storage {
    async fn store(&self, ctx: &Context, key: &str, value: &[u8]) -> Result<()> {
        self.entries.store(ctx, key, value).await
    }

    async fn load(&self, ctx: &Context, key: &str) -> Result<Bytes> {
        self.entries.load(ctx, key).await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.entries.delete(ctx, key).await
    }

    async fn exists(&self, ctx: &Context, key: &str) -> bool {
        self.entries.exists(ctx, key).await
    }

    async fn list(&self, ctx: &Context, prefix: &str, recursive: bool) -> Result<Vec<String>> {
        self.lister.list(ctx, prefix, recursive).await
    }

    async fn stat(&self, ctx: &Context, key: &str) -> Result<KeyInfo> {
        self.entries.stat(ctx, key).await
    }

    async fn lock(&self, ctx: &Context, name: &str) -> Result<()> {
        self.locks.lock(ctx, name).await
    }

    async fn unlock(&self, name: &str) -> Result<()> {
        self.locks.unlock(name).await
    }

    /// Only the first call does work; later calls return `Ok(())`.
    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let drained = self.locks.close().await;
        self.locker.close().await;
        self.client.close().await;

        tracing::info!("Closed storage ({} locks released)", drained);
        Ok(())
    }
}
