//! Tests for pool builders

use async_trait::async_trait;
use prometheus_substrate::builders::{build_pool, build_pools};
use prometheus_substrate::config::{PoolConfig, ServiceConfig};
use prometheus_substrate::core::{ResourceFactory, SubstrateError};

struct NamedFactory {
    pool: String,
}

#[async_trait]
impl ResourceFactory for NamedFactory {
    type Resource = String;

    async fn create(&self) -> anyhow::Result<String> {
        Ok(format!("{}-client", self.pool))
    }
}

#[tokio::test]
async fn test_build_pool_from_config() {
    let cfg = PoolConfig {
        max_size: 2,
        connecting_limit: 1,
        queue_timeout_ms: 100,
    };
    let pool = build_pool("mongo", &cfg, NamedFactory { pool: "mongo".into() }).unwrap();
    assert_eq!(pool.name(), "mongo");
    assert_eq!(pool.limits().max_size, 2);

    let client = pool.acquire().await.unwrap();
    assert_eq!(client.as_str(), "mongo-client");
}

#[test]
fn test_build_pool_rejects_invalid_config() {
    let cfg = PoolConfig {
        max_size: 0,
        ..PoolConfig::default()
    };
    let result = build_pool("mongo", &cfg, NamedFactory { pool: "mongo".into() });
    assert!(matches!(result, Err(SubstrateError::InvalidArgument(_))));
}

#[test]
fn test_build_pools_from_service_config() {
    let cfg = ServiceConfig::from_json_str(r#"{"pools": {"a": {}, "b": {"max_size": 3}}}"#)
        .unwrap();
    let pools = build_pools(&cfg, |name, _| {
        Ok(NamedFactory {
            pool: name.to_owned(),
        })
    })
    .unwrap();
    assert_eq!(pools.len(), 2);
    assert_eq!(pools["b"].limits().max_size, 3);
}

#[test]
fn test_build_pools_propagates_factory_error() {
    let cfg = ServiceConfig::from_json_str(r#"{"pools": {"a": {}}}"#).unwrap();
    let result = build_pools(&cfg, |name, _| -> Result<NamedFactory, SubstrateError> {
        Err(SubstrateError::invalid(format!("no credentials for {name}")))
    });
    assert!(result.is_err());
}
