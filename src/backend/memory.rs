//! In-memory backend
//!
//! A process-local node that answers the full command vocabulary, and a
//! client over it. Nothing is persisted; this is the store the tests and the
//! shell run against.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::error::{Result, StorageError};
use crate::protocol::{Command, Reply};

use super::{KvClient, Route};

/// Value stored under one key
#[derive(Debug, Clone)]
enum Value {
    Hash(HashMap<String, Bytes>),
    Str(Bytes),
}

/// Keys of one node plus the expiry deadlines of the volatile ones
#[derive(Debug, Default)]
struct Keyspace {
    entries: BTreeMap<String, Value>,
    expires: HashMap<String, Instant>,
}

impl Keyspace {
    fn has_expired(&self, now: Instant) -> bool {
        self.expires.values().any(|at| *at <= now)
    }

    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .expires
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            self.expires.remove(&key);
            self.entries.remove(&key);
        }
    }

    fn remove(&mut self, key: &str) -> bool {
        self.expires.remove(key);
        self.entries.remove(key).is_some()
    }
}

/// A single in-memory store node
///
/// ## Concurrency:
/// - `keyspace`: one RwLock; every command is applied under it, so each
///   command is atomic with respect to the others
/// - Keys are ordered (BTreeMap) so SCAN cursors walk a stable order
/// - Expired keys are purged before any access, so they are never observed
pub struct MemoryNode {
    /// Name for logging
    name: String,

    /// All keys on this node
    keyspace: RwLock<Keyspace>,

    /// When false every command fails (fault injection)
    available: AtomicBool,
}

impl MemoryNode {
    /// Create an empty node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keyspace: RwLock::new(Keyspace::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the node up or down
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether the node answers commands
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of live keys of any type
    pub fn key_count(&self) -> usize {
        self.purge_expired();
        self.keyspace.read().entries.len()
    }

    /// Whether `key` exists, bypassing availability
    pub fn contains_key(&self, key: &str) -> bool {
        self.purge_expired();
        self.keyspace.read().entries.contains_key(key)
    }

    /// Remaining time to live of `key`, if it is volatile
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.purge_expired();
        let now = Instant::now();
        self.keyspace
            .read()
            .expires
            .get(key)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Overwrite a single hash field directly, bypassing the command path
    pub fn put_raw_field(&self, key: &str, field: &str, value: impl Into<Bytes>) {
        let mut keyspace = self.keyspace.write();
        keyspace.expires.remove(key);
        let slot = keyspace
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()));
        if matches!(slot, Value::Str(_)) {
            *slot = Value::Hash(HashMap::new());
        }
        if let Value::Hash(fields) = slot {
            fields.insert(field.to_string(), value.into());
        }
    }

    /// Remove a single hash field directly, bypassing the command path
    pub fn remove_raw_field(&self, key: &str, field: &str) {
        let mut keyspace = self.keyspace.write();
        let now_empty = match keyspace.entries.get_mut(key) {
            Some(Value::Hash(fields)) => {
                fields.remove(field);
                fields.is_empty()
            }
            _ => false,
        };
        if now_empty {
            keyspace.remove(key);
        }
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        if self.keyspace.read().has_expired(now) {
            self.keyspace.write().purge_expired(now);
        }
    }

    /// Apply one command
    pub fn apply(&self, command: Command) -> Result<Reply> {
        if !self.is_available() {
            return Err(StorageError::Backend(format!(
                "node {} unavailable",
                self.name
            )));
        }
        self.purge_expired();

        match command {
            Command::HSet { key, fields } => {
                let mut keyspace = self.keyspace.write();
                let slot = keyspace
                    .entries
                    .entry(key.clone())
                    .or_insert_with(|| Value::Hash(HashMap::new()));
                let Value::Hash(existing) = slot else {
                    return Err(wrong_type(&key));
                };
                let mut added = 0;
                for (field, value) in fields {
                    if existing.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                Ok(Reply::Integer(added))
            }
            Command::HGet { key, field } => {
                let keyspace = self.keyspace.read();
                match keyspace.entries.get(&key) {
                    None => Ok(Reply::Bulk(None)),
                    Some(Value::Hash(fields)) => Ok(Reply::Bulk(fields.get(&field).cloned())),
                    Some(Value::Str(_)) => Err(wrong_type(&key)),
                }
            }
            Command::HMGet { key, fields } => {
                let keyspace = self.keyspace.read();
                match keyspace.entries.get(&key) {
                    None => Ok(Reply::Array(vec![None; fields.len()])),
                    Some(Value::Hash(stored)) => Ok(Reply::Array(
                        fields.iter().map(|f| stored.get(f).cloned()).collect(),
                    )),
                    Some(Value::Str(_)) => Err(wrong_type(&key)),
                }
            }
            Command::Del { key } => {
                let removed = self.keyspace.write().remove(&key);
                Ok(Reply::Integer(removed as i64))
            }
            Command::Exists { key } => {
                let exists = self.keyspace.read().entries.contains_key(&key);
                Ok(Reply::Integer(exists as i64))
            }
            Command::Scan {
                cursor,
                pattern,
                count,
            } => {
                let keyspace = self.keyspace.read();
                let start = cursor as usize;
                let examined: Vec<&String> = keyspace
                    .entries
                    .keys()
                    .skip(start)
                    .take(count.max(1))
                    .collect();
                let next = start + examined.len();
                let keys = examined
                    .into_iter()
                    .filter(|k| glob_match(&pattern, k))
                    .cloned()
                    .collect();
                let cursor = if next >= keyspace.entries.len() { 0 } else { next as u64 };
                Ok(Reply::Scan { cursor, keys })
            }
            Command::SetNx { key, value, ttl } => {
                let mut keyspace = self.keyspace.write();
                if keyspace.entries.contains_key(&key) {
                    return Ok(Reply::Integer(0));
                }
                if let Some(ttl) = ttl {
                    keyspace.expires.insert(key.clone(), Instant::now() + ttl);
                }
                keyspace.entries.insert(key, Value::Str(value));
                Ok(Reply::Integer(1))
            }
            Command::DelIfEq { key, value } => {
                let mut keyspace = self.keyspace.write();
                let matches = holds_token(&keyspace, &key, &value);
                if matches {
                    keyspace.remove(&key);
                }
                Ok(Reply::Integer(matches as i64))
            }
            Command::ExpireIfEq { key, value, ttl } => {
                let mut keyspace = self.keyspace.write();
                let matches = holds_token(&keyspace, &key, &value);
                if matches {
                    keyspace.expires.insert(key, Instant::now() + ttl);
                }
                Ok(Reply::Integer(matches as i64))
            }
        }
    }
}

fn holds_token(keyspace: &Keyspace, key: &str, token: &Bytes) -> bool {
    matches!(keyspace.entries.get(key), Some(Value::Str(current)) if current == token)
}

fn wrong_type(key: &str) -> StorageError {
    StorageError::Backend(format!(
        "WRONGTYPE operation against key '{}' holding the wrong kind of value",
        key
    ))
}

/// Match `text` against a glob supporting `*`, `?` and `\` escapes
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` and the text index it is currently absorbing up to
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((star_pi, star_ti)) => {
                pi = star_pi + 1;
                ti = star_ti + 1;
                star = Some((star_pi, star_ti + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// [`KvClient`] over in-memory nodes
///
/// Commands routed to [`Route::Replica`] go to the replica node when one is
/// attached and to the primary otherwise. Nodes do not replicate to each
/// other.
pub struct MemoryClient {
    primary: Arc<MemoryNode>,
    replica: Option<Arc<MemoryNode>>,
    latency: Duration,
    closed: AtomicBool,
}

impl MemoryClient {
    /// Client talking to `primary` only
    pub fn new(primary: Arc<MemoryNode>) -> Self {
        Self {
            primary,
            replica: None,
            latency: Duration::ZERO,
            closed: AtomicBool::new(false),
        }
    }

    /// Attach a replica node
    pub fn with_replica(mut self, replica: Arc<MemoryNode>) -> Self {
        self.replica = Some(replica);
        self
    }

    /// Delay every command by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// The primary node
    pub fn primary(&self) -> &Arc<MemoryNode> {
        &self.primary
    }

    /// Whether `close` was called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvClient for MemoryClient {
    async fn execute(&self, route: Route, command: Command) -> Result<Reply> {
        if self.is_closed() {
            return Err(StorageError::Backend("client closed".to_string()));
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let node = match (route, &self.replica) {
            (Route::Replica, Some(replica)) => replica,
            _ => &self.primary,
        };
        node.apply(command)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Closed memory client for node {}", self.primary.name());
        }
    }
}
