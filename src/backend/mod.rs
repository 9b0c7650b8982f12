//! Backend Module
//!
//! Seams to the externally supplied key-value client and lock primitive.
//!
//! ## Responsibilities
//! - Define the client contract ([`KvClient`]) and lock contract
//!   ([`DistributedLocker`]) the core runs against
//! - Route each command to the primary or a replica
//! - Bound every call by the caller's [`Context`]
//!
//! ## Provided implementations
//! - [`MemoryNode`] / [`MemoryClient`]: process-local store for tests and
//!   embedding
//! - [`QuorumLocker`]: majority-style lock over any set of [`KvClient`]s

mod memory;
mod quorum;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::ReplicaRouting;
use crate::context::Context;
use crate::error::Result;
use crate::protocol::{Command, Reply};

pub use memory::{MemoryClient, MemoryNode};
pub use quorum::QuorumLocker;

/// Where a command is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Primary,
    Replica,
}

/// A connected key-value client
///
/// Implementations must be safe for concurrent use; one instance is shared by
/// every operation of a storage instance.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Execute one command
    async fn execute(&self, route: Route, command: Command) -> Result<Reply>;

    /// Release the connection
    async fn close(&self);
}

/// Release capability for one acquired distributed lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    /// Logical lock name
    pub name: String,

    /// Store key the lock lives under
    pub key: String,

    /// Random token proving ownership
    pub token: Bytes,
}

/// A cluster-wide lock primitive
#[async_trait]
pub trait DistributedLocker: Send + Sync {
    /// Try to acquire `name`; bounded internal retry is up to the primitive
    ///
    /// When `ctx` fires, or the acquisition otherwise fails, anything already
    /// placed on the backend must be removed before returning.
    async fn acquire(&self, ctx: &Context, name: &str) -> Result<LockLease>;

    /// Release a previously acquired lease
    async fn release(&self, lease: LockLease) -> Result<()>;

    /// Release the primitive's connections
    async fn close(&self);
}

/// Sends commands to the client under routing policy and caller context
pub struct Dispatcher {
    client: Arc<dyn KvClient>,
    routing: ReplicaRouting,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn KvClient>, routing: ReplicaRouting) -> Self {
        Self { client, routing }
    }

    /// Execute `command`, aborting when `ctx` fires
    pub async fn call(&self, ctx: &Context, command: Command) -> Result<Reply> {
        let route = self.routing.route(&command);
        tracing::trace!(
            "{} {} via {:?}",
            command.command_type().name(),
            command.key().unwrap_or("-"),
            route
        );
        ctx.run(self.client.execute(route, command)).await
    }

    /// The routing policy in effect
    pub fn routing(&self) -> ReplicaRouting {
        self.routing
    }
}
