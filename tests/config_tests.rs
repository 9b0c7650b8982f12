//! Tests for configuration
//!
//! These tests verify:
//! - Defaults and builder
//! - Validation
//! - Replica routing parsing and decisions
//! - Deserialization with partial input

use bytes::Bytes;
use certkv::backend::Route;
use certkv::protocol::Command;
use certkv::{Config, ReplicaRouting, StorageError};

// =============================================================================
// Defaults / Builder Tests
// =============================================================================

#[test]
fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.lock_quorum, 2);
    assert_eq!(config.lock_key_prefix, "certlock");
    assert_eq!(config.scan_count, 50);
    assert_eq!(config.lock_retry_attempts, 0);
    assert_eq!(config.lock_validity().as_millis(), 5000);
    assert_eq!(config.replica_routing, ReplicaRouting::None);
    assert!(config.validate().is_ok());
}

#[test]
fn test_builder_sets_fields() {
    let config = Config::builder()
        .lock_quorum(3)
        .lock_key_prefix("mylocks")
        .lock_retry_attempts(4)
        .lock_retry_delay_ms(250)
        .lock_validity_ms(1500)
        .scan_count(500)
        .replica_routing(ReplicaRouting::ReadOnlyToReplica)
        .build();

    assert_eq!(config.lock_quorum, 3);
    assert_eq!(config.lock_key_prefix, "mylocks");
    assert_eq!(config.lock_retry_attempts, 4);
    assert_eq!(config.lock_retry_delay().as_millis(), 250);
    assert_eq!(config.lock_validity_ms, 1500);
    assert_eq!(config.scan_count, 500);
    assert_eq!(config.replica_routing, ReplicaRouting::ReadOnlyToReplica);
}

#[test]
fn test_validate_rejects_zero_quorum() {
    let config = Config::builder().lock_quorum(0).build();
    assert!(matches!(config.validate(), Err(StorageError::Config(_))));
}

#[test]
fn test_validate_rejects_zero_validity() {
    let config = Config::builder().lock_validity_ms(0).build();
    assert!(matches!(config.validate(), Err(StorageError::Config(_))));
}

#[test]
fn test_validate_rejects_zero_scan_count() {
    let config = Config::builder().scan_count(0).build();
    assert!(matches!(config.validate(), Err(StorageError::Config(_))));
}

// =============================================================================
// Replica Routing Tests
// =============================================================================

#[test]
fn test_routing_parse() {
    assert_eq!("".parse::<ReplicaRouting>().unwrap(), ReplicaRouting::None);
    assert_eq!("none".parse::<ReplicaRouting>().unwrap(), ReplicaRouting::None);
    assert_eq!(
        "readonly".parse::<ReplicaRouting>().unwrap(),
        ReplicaRouting::ReadOnlyToReplica
    );
    assert!(matches!(
        "always".parse::<ReplicaRouting>(),
        Err(StorageError::Config(_))
    ));
}

#[test]
fn test_routing_display_round_trips() {
    for routing in [ReplicaRouting::None, ReplicaRouting::ReadOnlyToReplica] {
        assert_eq!(routing.to_string().parse::<ReplicaRouting>().unwrap(), routing);
    }
}

#[test]
fn test_routing_decisions() {
    let read = Command::HGet {
        key: "k".to_string(),
        field: "value".to_string(),
    };
    let scan = Command::Scan {
        cursor: 0,
        pattern: "*".to_string(),
        count: 10,
    };
    let write = Command::HSet {
        key: "k".to_string(),
        fields: vec![("value".to_string(), Bytes::from_static(b"v"))],
    };
    let lock = Command::SetNx {
        key: "certlock:k".to_string(),
        value: Bytes::from_static(b"t"),
        ttl: None,
    };

    assert_eq!(ReplicaRouting::None.route(&read), Route::Primary);
    assert_eq!(ReplicaRouting::None.route(&write), Route::Primary);
    assert_eq!(ReplicaRouting::ReadOnlyToReplica.route(&read), Route::Replica);
    assert_eq!(ReplicaRouting::ReadOnlyToReplica.route(&scan), Route::Replica);
    assert_eq!(ReplicaRouting::ReadOnlyToReplica.route(&write), Route::Primary);
    assert_eq!(ReplicaRouting::ReadOnlyToReplica.route(&lock), Route::Primary);
}

// =============================================================================
// Deserialization Tests
// =============================================================================

#[test]
fn test_deserialize_partial_uses_defaults() {
    let config: Config =
        serde_json::from_str(r#"{"lock_quorum": 3, "replica_routing": "readonly"}"#).unwrap();

    assert_eq!(config.lock_quorum, 3);
    assert_eq!(config.replica_routing, ReplicaRouting::ReadOnlyToReplica);
    assert_eq!(config.scan_count, 50);
    assert_eq!(config.lock_key_prefix, "certlock");
}

#[test]
fn test_deserialize_rejects_unknown_routing() {
    let result: Result<Config, _> = serde_json::from_str(r#"{"replica_routing": "all"}"#);
    assert!(result.is_err());
}
