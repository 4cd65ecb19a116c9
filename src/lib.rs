//! # Prometheus Substrate
//!
//! Concurrency and resource-management substrate for the service layer that
//! hands database/HTTP clients and caches to application code.
//!
//! ## Components
//!
//! - **Task scheduling contract** ([`core::task`]): how work is spawned,
//!   suspended, resumed, awaited and cooperatively cancelled. Tokio provides
//!   the runtime ([`runtime::TokioSpawner`]).
//! - **Counting semaphore** ([`core::Semaphore`]): bounded admission gate with
//!   FIFO hand-off to suspended waiters and runtime capacity changes.
//! - **Resource pool** ([`core::ResourcePool`]): bounds live resources and
//!   concurrent construction, reuses idle resources through a lock-free
//!   queue and supports deadline-bounded acquisition. Handles return their
//!   resource on drop.
//! - **LRU cache** ([`cache::LruCache`]): fixed-capacity map with O(1)
//!   get/put and least-recently-used eviction, no internal locking.
//! - **Snapshot cache** ([`cache::SnapshotCache`]): periodic-refresh cache
//!   that swaps in immutable snapshots for lock-free readers.
//!
//! ## ResourcePool
//!
//! ```rust,ignore
//! use prometheus_substrate::core::{PoolLimits, ResourcePool};
//! use std::time::Duration;
//!
//! let pool = ResourcePool::new(
//!     "mongo-main",
//!     PoolLimits {
//!         max_size: 32,
//!         connecting_limit: 4,
//!         queue_timeout: Duration::from_secs(1),
//!     },
//!     my_factory, // implements ResourceFactory
//! )?;
//!
//! let client = pool.acquire().await?;
//! client.ping().await?;
//! // `client` goes back to the idle queue here
//! ```
//!
//! For complete examples, see:
//! - `tests/resource_pool_test.rs` - pool scenarios
//! - `tests/semaphore_test.rs` - ordering and stress tests

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling, admission control and pooling.
pub mod core;
/// LRU and snapshot caches.
pub mod cache;
/// Configuration models for pools and caches.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Runtime adapters for the scheduling contract.
pub mod runtime;
/// Shared utilities.
pub mod util;
