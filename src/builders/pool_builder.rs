//! Builders to construct resource pools from configuration.

use std::collections::HashMap;

use crate::config::{PoolConfig, ServiceConfig};
use crate::core::{ResourceFactory, ResourcePool, SubstrateError};

/// Build one pool from its configuration entry.
///
/// # Errors
///
/// Returns `SubstrateError::InvalidArgument` if the entry is invalid.
pub fn build_pool<F: ResourceFactory>(
    name: &str,
    cfg: &PoolConfig,
    factory: F,
) -> Result<ResourcePool<F>, SubstrateError> {
    cfg.validate()
        .map_err(|e| SubstrateError::invalid(format!("pool `{name}` invalid: {e}")))?;
    ResourcePool::new(name, cfg.limits(), factory)
}

/// Build every configured pool, asking `factory_for` for each pool's factory.
///
/// # Errors
///
/// Returns `SubstrateError::InvalidArgument` if the configuration is invalid,
/// or whatever `factory_for` returns.
pub fn build_pools<F, FF>(
    cfg: &ServiceConfig,
    mut factory_for: FF,
) -> Result<HashMap<String, ResourcePool<F>>, SubstrateError>
where
    F: ResourceFactory,
    FF: FnMut(&str, &PoolConfig) -> Result<F, SubstrateError>,
{
    cfg.validate()
        .map_err(|e| SubstrateError::invalid(format!("config invalid: {e}")))?;

    let mut pools = HashMap::with_capacity(cfg.pools.len());
    for (name, pool_cfg) in &cfg.pools {
        let factory = factory_for(name, pool_cfg)?;
        pools.insert(name.clone(), ResourcePool::new(name.as_str(), pool_cfg.limits(), factory)?);
    }
    Ok(pools)
}
