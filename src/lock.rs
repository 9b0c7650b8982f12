//! Lock coordinator
//!
//! Local bookkeeping on top of a [`DistributedLocker`].
//!
//! ## State per lock name (one storage instance)
//! ```text
//!            lock()                    unlock() / close()
//! UNLOCKED ─────────► ACQUIRING ─────► HELD ─────────────────────► UNLOCKED
//!                         │
//!                         └── failure / cancellation / close ──► UNLOCKED
//! ```
//!
//! ## Concurrency:
//! - `registry`: DashMap (sharded), so lock/unlock on unrelated names never
//!   contend on a single mutex
//! - A name is reserved (ACQUIRING) before any network I/O, so two concurrent
//!   `lock()` calls for the same name cannot both reach the backend
//! - `closed` is read-locked around every reservation and commit and
//!   write-locked once by `close()`, so after `close()` marks the coordinator
//!   no new reservation appears and no in-flight one can turn into HELD

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Notify;

use crate::backend::{DistributedLocker, LockLease};
use crate::context::Context;
use crate::error::{Result, StorageError};

/// Local state of one lock name
#[derive(Debug)]
enum Slot {
    /// Acquisition in flight
    Acquiring,

    /// Held, with the capability to release it
    Held(LockLease),
}

/// Tracks which distributed locks this instance holds
pub struct LockCoordinator {
    locker: Arc<dyn DistributedLocker>,
    registry: DashMap<String, Slot>,
    closed: RwLock<bool>,

    /// Signalled whenever an ACQUIRING slot settles
    settled: Notify,
}

impl LockCoordinator {
    pub fn new(locker: Arc<dyn DistributedLocker>) -> Self {
        Self {
            locker,
            registry: DashMap::new(),
            closed: RwLock::new(false),
            settled: Notify::new(),
        }
    }

    /// Acquire `name` cluster-wide
    ///
    /// Fails with [`StorageError::AlreadyHeld`] without touching the backend if
    /// this instance already holds or is acquiring `name`, and with
    /// [`StorageError::Closed`] once [`close`](Self::close) has begun. Backend,
    /// quorum and cancellation errors are returned as-is and leave no local
    /// state.
    pub async fn lock(&self, ctx: &Context, name: &str) -> Result<()> {
        let mut reservation = self.reserve(name)?;

        let lease = self.locker.acquire(ctx, name).await?;

        if let Err(lease) = reservation.commit(lease) {
            // Closed while acquiring: hand the lock back before close() moves on
            if let Err(e) = self.locker.release(lease).await {
                tracing::warn!("Release of lock {} acquired during close failed: {}", name, e);
            }
            return Err(StorageError::Closed);
        }

        tracing::debug!("Lock {} held", name);
        Ok(())
    }

    fn reserve<'a>(&'a self, name: &'a str) -> Result<Reservation<'a>> {
        let closed = self.closed.read();
        if *closed {
            return Err(StorageError::Closed);
        }

        match self.registry.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(StorageError::AlreadyHeld(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Slot::Acquiring);
            }
        }

        Ok(Reservation {
            coordinator: self,
            name,
            committed: false,
        })
    }

    /// Release `name`
    ///
    /// Local state is cleared before the backend release, so a failed release
    /// is reported but never leaves a stale local record. The release is not
    /// bounded by a caller context: abandoning it halfway would strand the
    /// lock on the backend.
    pub async fn unlock(&self, name: &str) -> Result<()> {
        let lease = match self.registry.remove_if(name, |_, slot| matches!(slot, Slot::Held(_))) {
            Some((_, Slot::Held(lease))) => lease,
            _ => return Err(StorageError::NotHeld(name.to_string())),
        };

        self.locker.release(lease).await.map_err(|e| {
            tracing::warn!("Release of lock {} failed: {}", name, e);
            e
        })?;

        tracing::debug!("Lock {} released", name);
        Ok(())
    }

    /// Refuse new locks, wait for in-flight acquisitions, then release
    /// everything held
    ///
    /// Returns the number of locks drained. The registry is empty when this
    /// returns, and stays empty.
    pub async fn close(&self) -> usize {
        *self.closed.write() = true;

        loop {
            let settled = self.settled.notified();
            if !self.has_in_flight() {
                break;
            }
            settled.await;
        }

        self.release_all().await
    }

    /// Release every held lock, ignoring individual failures
    ///
    /// Returns the number of locks drained. No held record remains when this
    /// returns.
    pub async fn release_all(&self) -> usize {
        let mut drained = 0;

        loop {
            let names = self.held_names();
            if names.is_empty() {
                break;
            }

            for name in names {
                let Some((_, Slot::Held(lease))) =
                    self.registry.remove_if(&name, |_, slot| matches!(slot, Slot::Held(_)))
                else {
                    continue;
                };
                if let Err(e) = self.locker.release(lease).await {
                    tracing::warn!("Release of lock {} during shutdown failed: {}", name, e);
                }
                drained += 1;
            }
        }

        drained
    }

    /// Whether this instance currently holds `name`
    pub fn is_held(&self, name: &str) -> bool {
        matches!(self.registry.get(name).as_deref(), Some(Slot::Held(_)))
    }

    /// Whether `close` has begun
    pub fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Number of locks this instance holds
    pub fn held_count(&self) -> usize {
        self.registry
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Held(_)))
            .count()
    }

    /// Names of the locks this instance holds, sorted
    pub fn held_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Held(_)))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    fn has_in_flight(&self) -> bool {
        self.registry
            .iter()
            .any(|entry| matches!(entry.value(), Slot::Acquiring))
    }
}

/// ACQUIRING slot that disappears unless committed
///
/// Dropping the `lock()` future mid-acquisition drops this too, so an
/// abandoned attempt never blocks later ones.
struct Reservation<'a> {
    coordinator: &'a LockCoordinator,
    name: &'a str,
    committed: bool,
}

impl Reservation<'_> {
    /// Turn the slot into HELD, or hand the lease back if closing
    fn commit(&mut self, lease: LockLease) -> std::result::Result<(), LockLease> {
        let closed = self.coordinator.closed.read();
        if *closed {
            return Err(lease);
        }
        self.coordinator
            .registry
            .insert(self.name.to_string(), Slot::Held(lease));
        self.committed = true;
        Ok(())
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.coordinator
                .registry
                .remove_if(self.name, |_, slot| matches!(slot, Slot::Acquiring));
        }
        self.coordinator.settled.notify_waiters();
    }
}
