//! Configuration models for pools and caches.

pub mod pool;

pub use pool::{CacheConfig, PoolConfig, ServiceConfig};
