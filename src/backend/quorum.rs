//! Quorum locker
//!
//! A lock is held when at least `quorum` nodes accepted a SETNX of the same
//! random token under the lock key. Every lock key carries a validity; while
//! a lease is held a background task extends it every half validity.
//!
//! ## Cleanup guarantees
//! - A failed round is rolled back with DELIFEQ before the next one
//! - A failed or cancelled acquisition rolls back every node before returning
//! - A dropped acquisition future rolls back from a spawned task
//! - Anything that escapes all of the above lapses after its validity

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::context::Context;
use crate::error::{Result, StorageError};
use crate::protocol::Command;

use super::{DistributedLocker, KvClient, LockLease, Route};

type Nodes = Arc<[Arc<dyn KvClient>]>;

/// [`DistributedLocker`] over a fixed set of nodes
pub struct QuorumLocker {
    nodes: Nodes,
    quorum: usize,
    key_prefix: String,
    retry_attempts: u32,
    retry_delay: Duration,
    validity: Duration,

    /// Renewal task stop signals, by lease token
    renewals: DashMap<Bytes, CancellationToken>,

    /// Parent of every renewal stop signal
    shutdown: CancellationToken,

    closed: AtomicBool,
}

impl QuorumLocker {
    /// Create a locker from the lock settings in `config`
    ///
    /// Fails if the quorum is zero or larger than the node count.
    pub fn new(nodes: Vec<Arc<dyn KvClient>>, config: &Config) -> Result<Self> {
        if config.lock_quorum < 1 {
            return Err(StorageError::Config(
                "lock_quorum must be at least 1".to_string(),
            ));
        }
        if config.lock_quorum > nodes.len() {
            return Err(StorageError::Config(format!(
                "lock_quorum {} exceeds the {} available lock nodes",
                config.lock_quorum,
                nodes.len()
            )));
        }
        if config.lock_validity_ms < 1 {
            return Err(StorageError::Config(
                "lock_validity_ms must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            nodes: Arc::from(nodes),
            quorum: config.lock_quorum,
            key_prefix: config.lock_key_prefix.clone(),
            retry_attempts: config.lock_retry_attempts,
            retry_delay: config.lock_retry_delay(),
            validity: config.lock_validity(),
            renewals: DashMap::new(),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Store key for lock `name`
    pub fn lock_key(&self, name: &str) -> String {
        format!("{}:{}", self.key_prefix, name)
    }

    /// Number of leases currently being renewed
    pub fn renewing_count(&self) -> usize {
        self.renewals.len()
    }

    /// Run acquisition rounds until one reaches the quorum
    ///
    /// Leaves whatever the last round placed on the nodes; the caller rolls
    /// back on error.
    async fn acquire_rounds(&self, ctx: &Context, name: &str, key: &str, token: &Bytes) -> Result<usize> {
        let mut acquired = 0;

        for attempt in 0..=self.retry_attempts {
            if attempt > 0 {
                let delay = self.retry_delay;
                ctx.run(async move {
                    tokio::time::sleep(delay).await;
                    Ok::<(), StorageError>(())
                })
                .await?;
            }

            acquired = set_on(ctx, &self.nodes, key, token, self.validity).await?;
            if acquired >= self.quorum {
                tracing::debug!(
                    "Acquired lock {} on {}/{} nodes (attempt {})",
                    name,
                    acquired,
                    self.nodes.len(),
                    attempt + 1
                );
                return Ok(acquired);
            }

            if attempt < self.retry_attempts {
                // Roll back the partial acquisition before the next round
                release_on(&self.nodes, key, token).await;
            }
        }

        Err(StorageError::QuorumNotReached {
            name: name.to_string(),
            acquired,
            required: self.quorum,
        })
    }

    /// Keep extending `key` until released, closed or lost
    fn start_renewal(&self, key: &str, token: &Bytes) {
        let stop = self.shutdown.child_token();
        self.renewals.insert(token.clone(), stop.clone());

        let nodes = Arc::clone(&self.nodes);
        let key = key.to_string();
        let token = token.clone();
        let validity = self.validity;
        let quorum = self.quorum;
        let interval = (validity / 2).max(Duration::from_millis(1));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                let extended = extend_on(&nodes, &key, &token, validity).await;
                if extended < quorum {
                    tracing::warn!(
                        "Lease on {} lost: extended on {} of {} required nodes",
                        key,
                        extended,
                        quorum
                    );
                    break;
                }
            }
        });
    }
}

#[async_trait]
impl DistributedLocker for QuorumLocker {
    async fn acquire(&self, ctx: &Context, name: &str) -> Result<LockLease> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("lock client closed".to_string()));
        }

        let key = self.lock_key(name);
        let token = Bytes::from(Uuid::new_v4().to_string());
        let rollback = Rollback {
            nodes: Arc::clone(&self.nodes),
            key: key.clone(),
            token: token.clone(),
            armed: true,
        };

        match self.acquire_rounds(ctx, name, &key, &token).await {
            Ok(_) => {
                rollback.disarm();
                self.start_renewal(&key, &token);
                Ok(LockLease {
                    name: name.to_string(),
                    key,
                    token,
                })
            }
            Err(e) => {
                let reached = release_on(&self.nodes, &key, &token).await;
                rollback.disarm();
                tracing::debug!(
                    "Acquisition of lock {} failed ({}); rolled back on {} nodes",
                    name,
                    e,
                    reached
                );
                Err(e)
            }
        }
    }

    async fn release(&self, lease: LockLease) -> Result<()> {
        if let Some((_, stop)) = self.renewals.remove(&lease.token) {
            stop.cancel();
        }

        let reached = release_on(&self.nodes, &lease.key, &lease.token).await;
        if reached == 0 {
            return Err(StorageError::Backend(format!(
                "no lock node reachable to release '{}'",
                lease.name
            )));
        }
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.renewals.clear();
        for node in self.nodes.iter() {
            node.close().await;
        }
        tracing::debug!("Closed quorum locker ({} nodes)", self.nodes.len());
    }
}

impl Drop for QuorumLocker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Rolls back an acquisition whose future was dropped mid-flight
struct Rollback {
    nodes: Nodes,
    key: String,
    token: Bytes,
    armed: bool,
}

impl Rollback {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                "Abandoned lock {} not rolled back (no runtime); it lapses after its validity",
                self.key
            );
            return;
        };

        let nodes = Arc::clone(&self.nodes);
        let key = std::mem::take(&mut self.key);
        let token = self.token.clone();
        runtime.spawn(async move {
            let reached = release_on(&nodes, &key, &token).await;
            tracing::debug!("Rolled back abandoned lock {} on {} nodes", key, reached);
        });
    }
}

/// SETNX `token` on every node; returns how many accepted it
///
/// Node failures count as refusals. Only a fired `ctx` aborts the round.
async fn set_on(ctx: &Context, nodes: &[Arc<dyn KvClient>], key: &str, token: &Bytes, ttl: Duration) -> Result<usize> {
    let mut acquired = 0;
    for node in nodes {
        let command = Command::SetNx {
            key: key.to_string(),
            value: token.clone(),
            ttl: Some(ttl),
        };
        match ctx.run(node.execute(Route::Primary, command)).await {
            Ok(reply) => match reply.into_integer() {
                Ok(1) => acquired += 1,
                Ok(_) => {}
                Err(e) => tracing::debug!("Unexpected SETNX reply for {}: {}", key, e),
            },
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => tracing::debug!("Lock node rejected SETNX for {}: {}", key, e),
        }
    }
    Ok(acquired)
}

/// DELIFEQ `token` on every node; returns how many nodes answered
async fn release_on(nodes: &[Arc<dyn KvClient>], key: &str, token: &Bytes) -> usize {
    let mut reached = 0;
    for node in nodes {
        let command = Command::DelIfEq {
            key: key.to_string(),
            value: token.clone(),
        };
        match node.execute(Route::Primary, command).await {
            Ok(_) => reached += 1,
            Err(e) => tracing::debug!("Lock node rejected DELIFEQ for {}: {}", key, e),
        }
    }
    reached
}

/// Reset the validity of `token` on every node; returns how many still held it
async fn extend_on(nodes: &[Arc<dyn KvClient>], key: &str, token: &Bytes, ttl: Duration) -> usize {
    let mut extended = 0;
    for node in nodes {
        let command = Command::ExpireIfEq {
            key: key.to_string(),
            value: token.clone(),
            ttl,
        };
        match node.execute(Route::Primary, command).await.and_then(|r| r.into_integer()) {
            Ok(1) => extended += 1,
            Ok(_) => {}
            Err(e) => tracing::trace!("Lock node rejected PEXPIREIFEQ for {}: {}", key, e),
        }
    }
    extended
}
