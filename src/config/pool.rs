//! Pool and cache configuration structures.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::PoolLimits;

const fn default_max_size() -> usize {
    128
}

const fn default_connecting_limit() -> usize {
    8
}

const fn default_queue_timeout_ms() -> u64 {
    1_000
}

const fn default_update_interval_ms() -> u64 {
    60_000
}

const fn default_full_update_every() -> u32 {
    10
}

/// Resource pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum live resources.
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Maximum resources under construction at once.
    #[serde(default = "default_connecting_limit")]
    pub connecting_limit: usize,
    /// Acquisition timeout in milliseconds.
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            connecting_limit: default_connecting_limit(),
            queue_timeout_ms: default_queue_timeout_ms(),
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("max_size must be greater than 0".into());
        }
        if self.connecting_limit == 0 {
            return Err("connecting_limit must be greater than 0".into());
        }
        if self.queue_timeout_ms == 0 {
            return Err("queue_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Limits consumed by [`crate::core::ResourcePool`].
    pub const fn limits(&self) -> PoolLimits {
        PoolLimits {
            max_size: self.max_size,
            connecting_limit: self.connecting_limit,
            queue_timeout: Duration::from_millis(self.queue_timeout_ms),
        }
    }

    /// Read `<PREFIX>_MAX_SIZE`, `<PREFIX>_CONNECTING_LIMIT` and
    /// `<PREFIX>_QUEUE_TIMEOUT_MS`, loading `.env` first if present.
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a description if a variable does not parse or the result is invalid.
    pub fn from_env(prefix: &str) -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();
        let cfg = Self {
            max_size: env_or(prefix, "MAX_SIZE", defaults.max_size)?,
            connecting_limit: env_or(prefix, "CONNECTING_LIMIT", defaults.connecting_limit)?,
            queue_timeout_ms: env_or(prefix, "QUEUE_TIMEOUT_MS", defaults.queue_timeout_ms)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_or<T>(prefix: &str, name: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = format!("{prefix}_{name}");
    match std::env::var(&key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("`{key}` invalid: {e}")),
        Err(_) => Ok(default),
    }
}

/// Snapshot cache refresh configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Interval between refreshes in milliseconds.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    /// Every N-th refresh is a full one; the rest are incremental.
    #[serde(default = "default_full_update_every")]
    pub full_update_every: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            full_update_every: default_full_update_every(),
        }
    }
}

impl CacheConfig {
    /// Validate cache configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.update_interval_ms == 0 {
            return Err("update_interval_ms must be greater than 0".into());
        }
        if self.full_update_every == 0 {
            return Err("full_update_every must be greater than 0".into());
        }
        Ok(())
    }

    /// Refresh interval.
    pub const fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Map of pool name to configuration.
    pub pools: HashMap<String, PoolConfig>,
    /// Map of cache name to configuration.
    #[serde(default)]
    pub caches: HashMap<String, CacheConfig>,
}

impl ServiceConfig {
    /// Validate all pools and caches and ensure at least one pool exists.
    ///
    /// # Errors
    ///
    /// Returns a description naming the offending entry.
    pub fn validate(&self) -> Result<(), String> {
        if self.pools.is_empty() {
            return Err("at least one pool must be defined".into());
        }
        for (name, pool) in &self.pools {
            pool.validate()
                .map_err(|e| format!("pool `{name}` invalid: {e}"))?;
        }
        for (name, cache) in &self.caches {
            cache
                .validate()
                .map_err(|e| format!("cache `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a description of the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
