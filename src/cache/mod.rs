//! Caches built on the core primitives.

pub mod lru;
pub mod snapshot;

pub use lru::LruCache;
pub use snapshot::{
    CachePolicy, DataSource, Snapshot, SnapshotCache, UpdateStatistics, UpdateType,
};
