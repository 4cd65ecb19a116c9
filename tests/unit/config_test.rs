//! Tests for configuration validation

use prometheus_substrate::config::{CacheConfig, PoolConfig, ServiceConfig};
use std::time::Duration;

#[test]
fn test_pool_config_validation() {
    let valid = PoolConfig {
        max_size: 16,
        connecting_limit: 4,
        queue_timeout_ms: 500,
    };
    assert!(valid.validate().is_ok());
    assert_eq!(valid.limits().queue_timeout, Duration::from_millis(500));
}

#[test]
fn test_pool_config_invalid_max_size() {
    let invalid = PoolConfig {
        max_size: 0,
        ..PoolConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_invalid_connecting_limit() {
    let invalid = PoolConfig {
        connecting_limit: 0,
        ..PoolConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_invalid_timeout() {
    let invalid = PoolConfig {
        queue_timeout_ms: 0,
        ..PoolConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_cache_config_validation() {
    assert!(CacheConfig::default().validate().is_ok());
    assert_eq!(
        CacheConfig::default().update_interval(),
        Duration::from_secs(60)
    );
    let invalid = CacheConfig {
        full_update_every: 0,
        ..CacheConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_service_config_from_json() {
    let json = r#"{
        "pools": {
            "mongo": { "max_size": 32, "connecting_limit": 4 },
            "postgres": {}
        },
        "caches": {
            "users": { "update_interval_ms": 5000 }
        }
    }"#;
    let cfg = ServiceConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.pools["mongo"].max_size, 32);
    assert_eq!(cfg.pools["postgres"], PoolConfig::default());
    assert_eq!(cfg.caches["users"].full_update_every, 10);
}

#[test]
fn test_service_config_rejects_invalid_entries() {
    assert!(ServiceConfig::from_json_str(r#"{"pools": {}}"#).is_err());

    let err = ServiceConfig::from_json_str(r#"{"pools": {"bad": {"max_size": 0}}}"#).unwrap_err();
    assert!(err.contains("bad"));

    assert!(ServiceConfig::from_json_str("not json").is_err());
}
