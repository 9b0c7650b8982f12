//! # certkv
//!
//! Certificate storage over a flat key-value store with:
//! - Hierarchical keys emulated on a flat keyspace
//! - Atomic multi-field records (value, last-modified, size)
//! - Cluster-wide locks acknowledged by a quorum of nodes
//! - Local bookkeeping of held locks, drained on close
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Certificate manager (caller)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ CertStorage
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Storage                              │
//! └──────┬──────────────────┬──────────────────────┬────────────┘
//!        │                  │                      │
//!        ▼                  ▼                      ▼
//! ┌─────────────┐    ┌─────────────┐       ┌───────────────┐
//! │ EntryStore  │    │   Lister    │       │LockCoordinator│
//! │  (codec)    │    │ (SCAN loop) │       │   (DashMap)   │
//! └──────┬──────┘    └──────┬──────┘       └───────┬───────┘
//!        └────────┬─────────┘                      │
//!                 ▼                                ▼
//!          ┌─────────────┐                ┌─────────────────┐
//!          │ Dispatcher  │                │DistributedLocker│
//!          │ (routing)   │                │   (quorum)      │
//!          └──────┬──────┘                └────────┬────────┘
//!                 ▼                                ▼
//!          ┌───────────────────────────────────────────────┐
//!          │                   KvClient                    │
//!          └───────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use certkv::{backend::MemoryNode, CertStorage, Config, Context, Storage};
//!
//! # async fn demo() -> certkv::Result<()> {
//! let nodes: Vec<Arc<MemoryNode>> = (0..3)
//!     .map(|i| Arc::new(MemoryNode::new(format!("node-{}", i))))
//!     .collect();
//! let storage = Storage::open_in_memory(Config::default(), &nodes)?;
//! let ctx = Context::background();
//!
//! storage.lock(&ctx, "issue/example.com").await?;
//! storage.store(&ctx, "certificates/example.com.crt", b"-----BEGIN CERTIFICATE-----").await?;
//! storage.unlock("issue/example.com").await?;
//! storage.close().await?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod context;

pub mod protocol;
pub mod backend;
pub mod entry;
pub mod listing;
pub mod lock;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StorageError, Result};
pub use config::{Config, ReplicaRouting};
pub use context::Context;
pub use entry::KeyInfo;
pub use storage::{CertStorage, Storage};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of certkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
