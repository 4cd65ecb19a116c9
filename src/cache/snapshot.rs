//! Periodic-refresh cache publishing immutable snapshots.
//!
//! A single writer rebuilds (or patches) a map from a [`DataSource`] and swaps
//! it in atomically; readers grab an `Arc` to the current map and never block
//! the writer. The shared map is never mutated in place.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;

use crate::core::{Spawn, SubstrateError, TaskHandle};

/// Describes what a snapshot cache loads and how it refreshes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Cache name, used in logs and errors.
    pub name: String,
    /// Statement selecting the full data set.
    pub query: String,
    /// Column holding the last-modified time. `None` disables incremental updates.
    pub updated_field: Option<String>,
}

impl CachePolicy {
    /// Policy with full updates only.
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            updated_field: None,
        }
    }

    /// Enable incremental updates keyed on `field`.
    #[must_use]
    pub fn with_updated_field(mut self, field: impl Into<String>) -> Self {
        self.updated_field = Some(field.into());
        self
    }

    /// Check that every required member is present.
    ///
    /// # Errors
    ///
    /// Returns `SubstrateError::InvalidArgument` naming the missing member.
    pub fn validate(&self) -> Result<(), SubstrateError> {
        if self.name.trim().is_empty() {
            return Err(SubstrateError::invalid("cache policy must have a name"));
        }
        if self.query.trim().is_empty() {
            return Err(SubstrateError::invalid(format!(
                "cache policy `{}` must have a query",
                self.name
            )));
        }
        if matches!(&self.updated_field, Some(field) if field.trim().is_empty()) {
            return Err(SubstrateError::invalid(format!(
                "cache policy `{}` has an empty updated_field; omit it to disable incremental updates",
                self.name
            )));
        }
        Ok(())
    }

    /// Query selecting rows modified since `$1`, if incremental updates are enabled.
    pub fn delta_query(&self) -> Option<String> {
        let field = self.updated_field.as_deref()?;
        let joiner = if self.query.to_ascii_lowercase().contains(" where ") {
            "and"
        } else {
            "where"
        };
        Some(format!("{} {joiner} {field} >= $1", self.query.trim_end()))
    }
}

/// Requested refresh kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateType {
    /// Rebuild the snapshot from scratch.
    Full,
    /// Patch the current snapshot with rows changed since the last update.
    Incremental,
}

/// Backend a snapshot cache loads from.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Map key.
    type Key: Eq + Hash + Clone + Send + Sync + 'static;
    /// Cached value.
    type Value: Clone + Send + Sync + 'static;

    /// Run `query`; `since` is bound to `$1` for incremental queries.
    async fn fetch(
        &self,
        query: &str,
        since: Option<SystemTime>,
    ) -> anyhow::Result<Vec<Self::Value>>;

    /// Extract the key of a loaded value.
    fn key_of(&self, value: &Self::Value) -> Self::Key;
}

/// Map published to readers.
pub type Snapshot<S> = HashMap<<S as DataSource>::Key, <S as DataSource>::Value>;

/// Refresh counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStatistics {
    /// Completed full updates.
    pub full_updates: u64,
    /// Completed incremental updates.
    pub incremental_updates: u64,
    /// Failed updates.
    pub failures: u64,
    /// Entries in the current snapshot.
    pub size: usize,
}

#[derive(Debug, Default)]
struct UpdateCounters {
    full_updates: AtomicU64,
    incremental_updates: AtomicU64,
    failures: AtomicU64,
    size: AtomicUsize,
}

/// Cache holding an atomically swapped snapshot of a data source.
pub struct SnapshotCache<S: DataSource> {
    policy: CachePolicy,
    delta_query: Option<String>,
    source: S,
    data: ArcSwap<Snapshot<S>>,
    /// Single-writer lock; holds the start time of the last successful update.
    writer: tokio::sync::Mutex<Option<SystemTime>>,
    counters: UpdateCounters,
}

impl<S: DataSource> SnapshotCache<S> {
    /// Create an empty cache. Call [`SnapshotCache::update`] or
    /// [`SnapshotCache::start_periodic`] to load it.
    ///
    /// # Errors
    ///
    /// Returns `SubstrateError::InvalidArgument` if the policy is incomplete.
    pub fn new(policy: CachePolicy, source: S) -> Result<Self, SubstrateError> {
        policy.validate()?;
        let delta_query = policy.delta_query();
        Ok(Self {
            policy,
            delta_query,
            source,
            data: ArcSwap::from_pointee(HashMap::new()),
            writer: tokio::sync::Mutex::new(None),
            counters: UpdateCounters::default(),
        })
    }

    /// Cache name.
    pub fn name(&self) -> &str {
        &self.policy.name
    }

    /// The policy this cache was built from.
    pub const fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Current snapshot. Cheap; never waits for a running update.
    pub fn get(&self) -> Arc<Snapshot<S>> {
        self.data.load_full()
    }

    /// Refresh the snapshot and return its new size.
    ///
    /// An incremental request falls back to a full update when the policy has
    /// no `updated_field` or nothing has been loaded yet.
    ///
    /// # Errors
    ///
    /// Returns `SubstrateError::UpdateFailed` if the data source fails; the
    /// previous snapshot stays published.
    pub async fn update(&self, requested: UpdateType) -> Result<usize, SubstrateError> {
        let mut last_update = self.writer.lock().await;
        let started = SystemTime::now();

        let (kind, fetched) = match (requested, self.delta_query.as_deref(), *last_update) {
            (UpdateType::Incremental, Some(delta), Some(since)) => (
                UpdateType::Incremental,
                self.source.fetch(delta, Some(since)).await,
            ),
            _ => (
                UpdateType::Full,
                self.source.fetch(&self.policy.query, None).await,
            ),
        };
        let rows = fetched.map_err(|source| {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(cache = %self.policy.name, ?kind, error = %source, "cache update failed");
            SubstrateError::UpdateFailed {
                cache: self.policy.name.clone(),
                source,
            }
        })?;

        let changed = rows.len();
        let mut next = match kind {
            UpdateType::Full => HashMap::with_capacity(changed),
            UpdateType::Incremental => (*self.data.load_full()).clone(),
        };
        for value in rows {
            next.insert(self.source.key_of(&value), value);
        }
        let size = next.len();
        self.data.store(Arc::new(next));
        *last_update = Some(started);

        let counter = match kind {
            UpdateType::Full => &self.counters.full_updates,
            UpdateType::Incremental => &self.counters.incremental_updates,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.counters.size.store(size, Ordering::Relaxed);
        tracing::debug!(cache = %self.policy.name, ?kind, changed, size, "cache updated");
        Ok(size)
    }

    /// Snapshot of the refresh counters.
    pub fn statistics(&self) -> UpdateStatistics {
        UpdateStatistics {
            full_updates: self.counters.full_updates.load(Ordering::Relaxed),
            incremental_updates: self.counters.incremental_updates.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            size: self.counters.size.load(Ordering::Relaxed),
        }
    }

    /// Spawn a refresher updating every `interval`.
    ///
    /// The first tick runs immediately as a full update; afterwards every
    /// `full_update_every`-th tick is full and the rest incremental. Cancel
    /// the returned handle to stop refreshing.
    pub fn start_periodic<Sp: Spawn>(
        self: &Arc<Self>,
        spawner: &Sp,
        interval: Duration,
        full_update_every: u32,
    ) -> TaskHandle<()> {
        let cache = Arc::clone(self);
        let full_every = u64::from(full_update_every.max(1));
        tracing::info!(cache = %cache.policy.name, ?interval, full_every, "starting periodic cache updates");
        spawner.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            for tick in 0_u64.. {
                ticker.tick().await;
                let kind = if tick % full_every == 0 {
                    UpdateType::Full
                } else {
                    UpdateType::Incremental
                };
                // Failures are logged and counted; the next tick retries.
                let _ = cache.update(kind).await;
            }
        })
    }
}
