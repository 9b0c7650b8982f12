//! Protocol Module
//!
//! Typed vocabulary of the backing key-value store.
//!
//! The core never speaks a wire format itself. It builds [`Command`]s and
//! hands them to a [`KvClient`](crate::backend::KvClient), which maps them to
//! whatever the connected server understands and answers with a [`Reply`].
//!
//! ### Commands
//! - HSET     - set several hash fields on one key atomically
//! - HGET     - read one hash field
//! - HMGET    - read several hash fields
//! - DEL      - remove a key
//! - EXISTS   - check a key
//! - SCAN     - cursor-based key iteration with a glob pattern
//! - SETNX    - set a string key only if absent, optionally expiring (lock acquisition)
//! - DELIFEQ  - delete a string key only if it holds a value (lock release)
//! - PEXPIREIFEQ - reset a string key's expiry only if it holds a value (lock renewal)
//!
//! ### Scan cursor protocol
//! ```text
//! cursor=0 ──► SCAN ──► (cursor=17, keys…) ──► SCAN ──► (cursor=0, keys…)  done
//! ```

mod command;
mod response;

pub use command::{Command, CommandType};
pub use response::Reply;
