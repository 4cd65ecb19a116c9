//! Core admission-control, scheduling and pooling abstractions.

pub mod error;
pub mod task;
pub mod semaphore;
pub mod resource_pool;

pub use error::{AppResult, SubstrateError};
pub use task::{
    cancellable, suspend_current_task, ResumeToken, Spawn, Suspend, TaskHandle, TaskState,
};
pub use semaphore::{Acquire, Semaphore, SemaphorePermit};
pub use resource_pool::{PoolLimits, PoolStats, PooledResource, ResourceFactory, ResourcePool};
