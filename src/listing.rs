//! Hierarchical listing
//!
//! Emulates directories over the flat keyspace. Nothing directory-like is
//! stored: "a/b" is a directory only because some key starts with "a/b/".
//!
//! ## Scan loop
//! ```text
//! cursor = 0
//! loop {
//!     (cursor, keys) = SCAN cursor MATCH "<prefix>*" COUNT n
//!     collect(keys)
//!     if cursor == 0 { break }     // full cycle, not a round count
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::backend::Dispatcher;
use crate::context::Context;
use crate::error::Result;
use crate::protocol::Command;

/// Cursor value that starts and ends a scan
pub const SCAN_START: u64 = 0;

/// Directory-style listing over prefix scans
pub struct Lister {
    dispatcher: Arc<Dispatcher>,
    scan_count: usize,

    /// Keys starting with this never appear in results
    hidden_prefix: Option<String>,
}

impl Lister {
    pub fn new(dispatcher: Arc<Dispatcher>, scan_count: usize) -> Self {
        Self {
            dispatcher,
            scan_count,
            hidden_prefix: None,
        }
    }

    /// Leave keys starting with `prefix` out of every listing
    ///
    /// Used for lock keys when locks share a node with the data.
    pub fn hiding(mut self, prefix: impl Into<String>) -> Self {
        self.hidden_prefix = Some(prefix.into());
        self
    }

    /// List keys under `prefix`
    ///
    /// - `recursive`: every matching key, deduplicated
    /// - otherwise: the immediate children of `prefix`, as `prefix/child`
    ///
    /// Results are sorted. A failing scan round aborts the whole listing.
    pub async fn list(&self, ctx: &Context, prefix: &str, recursive: bool) -> Result<Vec<String>> {
        let pattern = format!("{}*", escape_glob(prefix));
        let dir = prefix.trim_end_matches('/');

        let mut found = BTreeSet::new();
        let mut cursor = SCAN_START;
        let mut rounds = 0usize;

        loop {
            let command = Command::Scan {
                cursor,
                pattern: pattern.clone(),
                count: self.scan_count,
            };
            let (next, keys) = self.dispatcher.call(ctx, command).await?.into_scan()?;
            rounds += 1;

            for key in keys {
                if self.is_hidden(&key) {
                    continue;
                }
                if recursive {
                    found.insert(key);
                } else if let Some(child) = child_of(dir, &key) {
                    found.insert(child);
                }
            }

            if next == SCAN_START {
                break;
            }
            cursor = next;
        }

        tracing::debug!(
            "Listed '{}' (recursive={}): {} entries in {} scan rounds",
            prefix,
            recursive,
            found.len(),
            rounds
        );
        Ok(found.into_iter().collect())
    }

    fn is_hidden(&self, key: &str) -> bool {
        self.hidden_prefix
            .as_deref()
            .is_some_and(|hidden| key.starts_with(hidden))
    }
}

/// Immediate child of `dir` that `key` lives under, as `dir/segment`
///
/// Returns `None` for keys outside `dir/` (including `dir` itself). An empty
/// `dir` is the root.
pub fn child_of(dir: &str, key: &str) -> Option<String> {
    let rest = if dir.is_empty() {
        key.trim_start_matches('/')
    } else {
        key.strip_prefix(dir)?.strip_prefix('/')?
    };

    let segment = rest.split('/').next().filter(|s| !s.is_empty())?;

    if dir.is_empty() {
        Some(segment.to_string())
    } else {
        Some(format!("{}/{}", dir, segment))
    }
}

/// Escape glob metacharacters so `prefix` matches literally
pub fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
