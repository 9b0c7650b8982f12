//! Tests for the in-memory backend, replies and contexts
//!
//! These tests verify:
//! - Command semantics of MemoryNode (HSET/HGET/HMGET/DEL/EXISTS)
//! - SCAN cursor protocol
//! - SETNX / DELIFEQ / PEXPIREIFEQ lock primitives and key expiry
//! - MemoryClient routing, latency and close
//! - Reply shape checks
//! - Context cancellation and deadlines

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use certkv::backend::{Dispatcher, KvClient, MemoryClient, MemoryNode, Route};
use certkv::protocol::{Command, CommandType, Reply};
use certkv::{Context, ReplicaRouting, StorageError};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Helper Functions
// =============================================================================

fn hset(key: &str, fields: &[(&str, &str)]) -> Command {
    Command::HSet {
        key: key.to_string(),
        fields: fields
            .iter()
            .map(|(f, v)| (f.to_string(), Bytes::copy_from_slice(v.as_bytes())))
            .collect(),
    }
}

fn scan(cursor: u64, pattern: &str, count: usize) -> Command {
    Command::Scan {
        cursor,
        pattern: pattern.to_string(),
        count,
    }
}

// =============================================================================
// Hash Command Tests
// =============================================================================

#[test]
fn test_hset_counts_new_fields() {
    let node = MemoryNode::new("n");

    let first = node.apply(hset("k", &[("a", "1"), ("b", "2")])).unwrap();
    let second = node.apply(hset("k", &[("b", "3"), ("c", "4")])).unwrap();

    assert_eq!(first, Reply::Integer(2));
    assert_eq!(second, Reply::Integer(1));
}

#[test]
fn test_hmget_preserves_field_order_and_gaps() {
    let node = MemoryNode::new("n");
    node.apply(hset("k", &[("a", "1"), ("c", "3")])).unwrap();

    let reply = node
        .apply(Command::HMGet {
            key: "k".to_string(),
            fields: vec!["c".to_string(), "b".to_string(), "a".to_string()],
        })
        .unwrap();

    assert_eq!(
        reply,
        Reply::Array(vec![
            Some(Bytes::from_static(b"3")),
            None,
            Some(Bytes::from_static(b"1")),
        ])
    );
}

#[test]
fn test_hmget_missing_key_returns_all_none() {
    let node = MemoryNode::new("n");

    let reply = node
        .apply(Command::HMGet {
            key: "missing".to_string(),
            fields: vec!["a".to_string(), "b".to_string()],
        })
        .unwrap();

    assert_eq!(reply, Reply::Array(vec![None, None]));
}

#[test]
fn test_del_and_exists() {
    let node = MemoryNode::new("n");
    node.apply(hset("k", &[("a", "1")])).unwrap();

    let exists = |node: &MemoryNode| {
        node.apply(Command::Exists { key: "k".to_string() })
            .unwrap()
            .into_integer()
            .unwrap()
    };

    assert_eq!(exists(&node), 1);
    assert_eq!(node.apply(Command::Del { key: "k".to_string() }).unwrap(), Reply::Integer(1));
    assert_eq!(node.apply(Command::Del { key: "k".to_string() }).unwrap(), Reply::Integer(0));
    assert_eq!(exists(&node), 0);
}

#[test]
fn test_hset_on_string_key_is_wrong_type() {
    let node = MemoryNode::new("n");
    node.apply(Command::SetNx {
        key: "k".to_string(),
        value: Bytes::from_static(b"t"),
        ttl: None,
    })
    .unwrap();

    let err = node.apply(hset("k", &[("a", "1")])).unwrap_err();

    assert!(matches!(err, StorageError::Backend(ref m) if m.contains("WRONGTYPE")));
}

#[test]
fn test_unavailable_node_rejects_everything() {
    let node = MemoryNode::new("down");
    node.set_available(false);

    assert!(node.apply(Command::Exists { key: "k".to_string() }).is_err());
    assert!(node.apply(scan(0, "*", 10)).is_err());

    node.set_available(true);
    assert!(node.apply(Command::Exists { key: "k".to_string() }).is_ok());
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_full_cycle_returns_to_zero() {
    let node = MemoryNode::new("n");
    for i in 0..25 {
        node.apply(hset(&format!("key-{:02}", i), &[("v", "x")])).unwrap();
    }

    let mut cursor = 0;
    let mut seen = Vec::new();
    let mut rounds = 0;
    loop {
        let (next, keys) = node.apply(scan(cursor, "*", 10)).unwrap().into_scan().unwrap();
        seen.extend(keys);
        rounds += 1;
        if next == 0 {
            break;
        }
        cursor = next;
    }

    assert_eq!(rounds, 3);
    assert_eq!(seen.len(), 25);
}

#[test]
fn test_scan_rounds_may_be_empty_after_filtering() {
    let node = MemoryNode::new("n");
    node.apply(hset("a/1", &[("v", "x")])).unwrap();
    node.apply(hset("b/1", &[("v", "x")])).unwrap();
    node.apply(hset("c/1", &[("v", "x")])).unwrap();

    // Second key examined is b/1, which does not match
    let (cursor, keys) = node.apply(scan(1, "a*", 1)).unwrap().into_scan().unwrap();

    assert!(keys.is_empty());
    assert_ne!(cursor, 0);
}

#[test]
fn test_scan_empty_node() {
    let node = MemoryNode::new("n");
    let (cursor, keys) = node.apply(scan(0, "*", 10)).unwrap().into_scan().unwrap();

    assert_eq!(cursor, 0);
    assert!(keys.is_empty());
}

// =============================================================================
// Lock Primitive Tests
// =============================================================================

#[test]
fn test_setnx_only_sets_once() {
    let node = MemoryNode::new("n");
    let set = |token: &'static [u8]| {
        node.apply(Command::SetNx {
            key: "lock".to_string(),
            value: Bytes::from_static(token),
            ttl: None,
        })
        .unwrap()
    };

    assert_eq!(set(b"a"), Reply::Integer(1));
    assert_eq!(set(b"b"), Reply::Integer(0));
}

#[test]
fn test_del_if_eq_checks_token() {
    let node = MemoryNode::new("n");
    node.apply(Command::SetNx {
        key: "lock".to_string(),
        value: Bytes::from_static(b"owner"),
        ttl: None,
    })
    .unwrap();

    let wrong = node
        .apply(Command::DelIfEq {
            key: "lock".to_string(),
            value: Bytes::from_static(b"intruder"),
        })
        .unwrap();
    assert_eq!(wrong, Reply::Integer(0));
    assert!(node.contains_key("lock"));

    let right = node
        .apply(Command::DelIfEq {
            key: "lock".to_string(),
            value: Bytes::from_static(b"owner"),
        })
        .unwrap();
    assert_eq!(right, Reply::Integer(1));
    assert!(!node.contains_key("lock"));
}

#[tokio::test]
async fn test_setnx_with_ttl_expires() {
    let node = MemoryNode::new("n");
    node.apply(Command::SetNx {
        key: "lock".to_string(),
        value: Bytes::from_static(b"a"),
        ttl: Some(Duration::from_millis(40)),
    })
    .unwrap();
    assert!(node.contains_key("lock"));
    assert!(node.ttl("lock").is_some());

    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(!node.contains_key("lock"));
    let retaken = node
        .apply(Command::SetNx {
            key: "lock".to_string(),
            value: Bytes::from_static(b"b"),
            ttl: None,
        })
        .unwrap();
    assert_eq!(retaken, Reply::Integer(1));
    assert_eq!(node.ttl("lock"), None);
}

#[tokio::test]
async fn test_expire_if_eq_extends_only_for_owner() {
    let node = MemoryNode::new("n");
    node.apply(Command::SetNx {
        key: "lock".to_string(),
        value: Bytes::from_static(b"owner"),
        ttl: Some(Duration::from_millis(60)),
    })
    .unwrap();

    let intruder = node
        .apply(Command::ExpireIfEq {
            key: "lock".to_string(),
            value: Bytes::from_static(b"intruder"),
            ttl: Duration::from_secs(10),
        })
        .unwrap();
    assert_eq!(intruder, Reply::Integer(0));

    let owner = node
        .apply(Command::ExpireIfEq {
            key: "lock".to_string(),
            value: Bytes::from_static(b"owner"),
            ttl: Duration::from_secs(10),
        })
        .unwrap();
    assert_eq!(owner, Reply::Integer(1));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(node.contains_key("lock"));
}

#[test]
fn test_expire_if_eq_on_missing_key() {
    let node = MemoryNode::new("n");

    let reply = node
        .apply(Command::ExpireIfEq {
            key: "gone".to_string(),
            value: Bytes::from_static(b"t"),
            ttl: Duration::from_secs(1),
        })
        .unwrap();

    assert_eq!(reply, Reply::Integer(0));
    assert_eq!(node.key_count(), 0);
}

// =============================================================================
// Client Tests
// =============================================================================

#[tokio::test]
async fn test_client_routes_to_replica() {
    let primary = Arc::new(MemoryNode::new("primary"));
    let replica = Arc::new(MemoryNode::new("replica"));
    replica.put_raw_field("k", "value", "from-replica");
    primary.put_raw_field("k", "value", "from-primary");

    let client = MemoryClient::new(Arc::clone(&primary)).with_replica(Arc::clone(&replica));
    let get = || Command::HGet {
        key: "k".to_string(),
        field: "value".to_string(),
    };

    let from_primary = client.execute(Route::Primary, get()).await.unwrap();
    let from_replica = client.execute(Route::Replica, get()).await.unwrap();

    assert_eq!(from_primary, Reply::Bulk(Some(Bytes::from_static(b"from-primary"))));
    assert_eq!(from_replica, Reply::Bulk(Some(Bytes::from_static(b"from-replica"))));
}

#[tokio::test]
async fn test_client_without_replica_uses_primary() {
    let primary = Arc::new(MemoryNode::new("primary"));
    primary.put_raw_field("k", "value", "v");
    let client = MemoryClient::new(primary);

    let reply = client
        .execute(Route::Replica, Command::Exists { key: "k".to_string() })
        .await
        .unwrap();

    assert_eq!(reply, Reply::Integer(1));
}

#[tokio::test]
async fn test_closed_client_fails() {
    let client = MemoryClient::new(Arc::new(MemoryNode::new("n")));

    client.close().await;
    client.close().await;

    assert!(client.is_closed());
    assert!(matches!(
        client.execute(Route::Primary, Command::Exists { key: "k".to_string() }).await,
        Err(StorageError::Backend(_))
    ));
}

#[tokio::test]
async fn test_dispatcher_applies_routing() {
    let primary = Arc::new(MemoryNode::new("primary"));
    let replica = Arc::new(MemoryNode::new("replica"));
    replica.put_raw_field("k", "value", "v");
    let client: Arc<dyn KvClient> =
        Arc::new(MemoryClient::new(Arc::clone(&primary)).with_replica(replica));

    let plain = Dispatcher::new(Arc::clone(&client), ReplicaRouting::None);
    let readonly = Dispatcher::new(client, ReplicaRouting::ReadOnlyToReplica);
    let ctx = Context::background();
    let exists = || Command::Exists { key: "k".to_string() };

    assert_eq!(plain.call(&ctx, exists()).await.unwrap(), Reply::Integer(0));
    assert_eq!(readonly.call(&ctx, exists()).await.unwrap(), Reply::Integer(1));
    assert_eq!(readonly.routing(), ReplicaRouting::ReadOnlyToReplica);
}

// =============================================================================
// Reply / Command Tests
// =============================================================================

#[test]
fn test_reply_shape_mismatch_is_backend_error() {
    assert!(matches!(Reply::Ok.into_bulk(), Err(StorageError::Backend(_))));
    assert!(matches!(Reply::Integer(1).into_array(), Err(StorageError::Backend(_))));
    assert!(matches!(Reply::Bulk(None).into_scan(), Err(StorageError::Backend(_))));
    assert!(matches!(Reply::Array(vec![]).into_integer(), Err(StorageError::Backend(_))));
}

#[test]
fn test_command_classification() {
    let del = Command::Del { key: "k".to_string() };
    assert_eq!(del.command_type(), CommandType::Del);
    assert_eq!(del.command_type().name(), "DEL");
    assert!(!del.is_read_only());
    assert_eq!(del.key(), Some("k"));

    let s = scan(0, "*", 1);
    assert!(s.is_read_only());
    assert_eq!(s.key(), None);
}

// =============================================================================
// Context Tests
// =============================================================================

#[tokio::test]
async fn test_context_passes_through_results() {
    let ctx = Context::background();

    let ok = ctx.run(async { Ok::<_, StorageError>(7) }).await.unwrap();
    let err = ctx
        .run(async { Err::<(), _>(StorageError::Backend("boom".to_string())) })
        .await
        .unwrap_err();

    assert_eq!(ok, 7);
    assert!(matches!(err, StorageError::Backend(_)));
}

#[tokio::test]
async fn test_context_expired_deadline_skips_operation() {
    let ctx = Context::with_timeout(Duration::ZERO);
    let mut polled = false;

    let err = ctx
        .run(async {
            polled = true;
            Ok::<_, StorageError>(())
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(!polled);
    assert!(ctx.is_done());
}

#[tokio::test]
async fn test_context_external_token() {
    let token = CancellationToken::new();
    let ctx = Context::with_token(token.clone());
    assert!(!ctx.is_done());

    token.cancel();

    assert!(ctx.is_done());
    let err = ctx.run(async { Ok::<_, StorageError>(()) }).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_context_deadline_interrupts_pending_operation() {
    let ctx = Context::with_timeout(Duration::from_millis(10));

    let err = ctx
        .run(async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StorageError>(())
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
}
