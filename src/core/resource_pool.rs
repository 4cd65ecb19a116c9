//! Bounded pool of expensive resources (network clients, connections).
//!
//! Two semaphores gate acquisition: `size_semaphore` caps how many resources
//! exist at all, `connecting_semaphore` caps how many are being constructed
//! at once so a cold start or mass expiry does not open a connection storm.
//! Idle resources sit in a lock-free MPMC queue (`crossbeam-channel`), so the
//! reuse path never suspends.
//!
//! A size slot is taken when a resource is created and held until that
//! resource is destroyed. Returning a handle puts the resource back on the
//! idle queue and keeps its slot.
//!
//! ```text
//! Unborn -> Connecting -> CheckedOut <-> Idle -> Destroyed
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::core::semaphore::SemaphorePermit;
use crate::core::{Semaphore, SubstrateError};
use crate::util::Deadline;

/// Creates and destroys the native resources a pool manages.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_substrate::core::ResourceFactory;
///
/// struct MongoClients { uri: String }
///
/// #[async_trait]
/// impl ResourceFactory for MongoClients {
///     type Resource = MongoClient;
///
///     async fn create(&self) -> anyhow::Result<MongoClient> {
///         MongoClient::connect(&self.uri).await
///     }
/// }
/// ```
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The pooled resource type.
    type Resource: Send + 'static;

    /// Build a new resource. Failures surface as `ConnectionFailed`.
    async fn create(&self) -> anyhow::Result<Self::Resource>;

    /// Tear a resource down. Defaults to dropping it.
    fn destroy(&self, resource: Self::Resource) {
        drop(resource);
    }
}

/// Configuration values for capacity enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLimits {
    /// Maximum number of live resources (idle + checked out).
    pub max_size: usize,
    /// Maximum number of resources under construction at once.
    pub connecting_limit: usize,
    /// Default wait bound for [`ResourcePool::acquire`].
    pub queue_timeout: Duration,
}

impl PoolLimits {
    /// Validate limit values.
    ///
    /// # Errors
    ///
    /// Returns `SubstrateError::InvalidArgument` for a zero limit or timeout.
    pub fn validate(&self) -> Result<(), SubstrateError> {
        if self.max_size == 0 {
            return Err(SubstrateError::invalid("max_size must be greater than 0"));
        }
        if self.connecting_limit == 0 {
            return Err(SubstrateError::invalid("connecting_limit must be greater than 0"));
        }
        if self.queue_timeout.is_zero() {
            return Err(SubstrateError::invalid("queue_timeout must be greater than 0"));
        }
        Ok(())
    }
}

/// Point-in-time view of pool bookkeeping.
///
/// At quiescence `created == destroyed + idle + checked_out` and
/// `size_slots_in_use == idle + checked_out`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Configured size cap.
    pub max_size: usize,
    /// Configured construction fan-out.
    pub connecting_limit: usize,
    /// Resources waiting in the idle queue.
    pub idle: usize,
    /// Resources held by handles.
    pub checked_out: usize,
    /// Resources constructed over the pool's lifetime.
    pub created: u64,
    /// Resources destroyed over the pool's lifetime.
    pub destroyed: u64,
    /// Size-semaphore permits currently held.
    pub size_slots_in_use: usize,
}

#[derive(Debug, Default)]
struct PoolCounters {
    checked_out: AtomicUsize,
    created: AtomicU64,
    destroyed: AtomicU64,
}

struct Idle<R> {
    id: Uuid,
    resource: R,
}

struct PoolShared<F: ResourceFactory> {
    name: String,
    limits: RwLock<PoolLimits>,
    factory: F,
    size_semaphore: Semaphore,
    connecting_semaphore: Semaphore,
    idle_tx: Sender<Idle<F::Resource>>,
    idle_rx: Receiver<Idle<F::Resource>>,
    /// Signaled whenever a resource lands on the idle queue, and on shutdown.
    returned: Notify,
    closed: AtomicBool,
    counters: PoolCounters,
}

impl<F: ResourceFactory> PoolShared<F> {
    fn try_pop_idle(&self) -> Option<Idle<F::Resource>> {
        self.idle_rx.try_recv().ok()
    }

    fn push_idle(&self, idle: Idle<F::Resource>) {
        if self.closed.load(Ordering::Acquire) {
            self.destroy(idle);
            return;
        }
        if let Err(err) = self.idle_tx.send(idle) {
            // Unreachable while we own the receiver; never drop a slot silently.
            self.destroy(err.into_inner());
            return;
        }
        self.returned.notify_one();
        // Shutdown may have drained the queue between the check and the send.
        if self.closed.load(Ordering::Acquire) {
            self.drain_idle();
        }
    }

    /// Destroy a resource and give its size slot back.
    fn destroy(&self, idle: Idle<F::Resource>) {
        tracing::debug!(pool = %self.name, resource = %idle.id, "destroying resource");
        self.factory.destroy(idle.resource);
        self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        self.size_semaphore.release();
    }

    fn drain_idle(&self) -> usize {
        let mut destroyed = 0;
        while let Some(idle) = self.try_pop_idle() {
            self.destroy(idle);
            destroyed += 1;
        }
        destroyed
    }

    fn exhausted(&self) -> SubstrateError {
        SubstrateError::PoolExhausted {
            pool: self.name.clone(),
        }
    }

    fn closed_error(&self) -> SubstrateError {
        SubstrateError::PoolClosed {
            pool: self.name.clone(),
        }
    }
}

impl<F: ResourceFactory> Drop for PoolShared<F> {
    fn drop(&mut self) {
        let destroyed = self.drain_idle();
        if destroyed > 0 {
            tracing::debug!(pool = %self.name, destroyed, "released idle resources on drop");
        }
    }
}

/// Outcome of waiting for room in the pool.
enum SlotWait<'a, R> {
    /// A fresh size slot to build a resource under.
    Reserved(SemaphorePermit<'a>),
    /// A resource came back to the idle queue while we waited.
    Reused(Idle<R>),
    /// The pool shut down while we waited.
    Closed,
}

/// Resource pool with bounded size, bounded connect fan-out and idle reuse.
///
/// Cloning is cheap; all clones share one pool.
pub struct ResourcePool<F: ResourceFactory> {
    shared: Arc<PoolShared<F>>,
}

impl<F: ResourceFactory> Clone for ResourcePool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for ResourcePool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.shared.name)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<F: ResourceFactory> ResourcePool<F> {
    /// Create an empty pool. Resources are built lazily on demand.
    ///
    /// # Errors
    ///
    /// Returns `SubstrateError::InvalidArgument` if `limits` is invalid.
    pub fn new(name: impl Into<String>, limits: PoolLimits, factory: F) -> Result<Self, SubstrateError> {
        limits.validate()?;
        let name = name.into();
        let (idle_tx, idle_rx) = unbounded();
        let shared = PoolShared {
            size_semaphore: Semaphore::new(limits.max_size)?,
            connecting_semaphore: Semaphore::new(limits.connecting_limit)?,
            limits: RwLock::new(limits),
            factory,
            idle_tx,
            idle_rx,
            returned: Notify::new(),
            closed: AtomicBool::new(false),
            counters: PoolCounters::default(),
            name,
        };
        tracing::info!(
            pool = %shared.name,
            max_size = limits.max_size,
            connecting_limit = limits.connecting_limit,
            queue_timeout_ms = u64::try_from(limits.queue_timeout.as_millis()).unwrap_or(u64::MAX),
            "resource pool initialized"
        );
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Pool identifier.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current limits.
    pub fn limits(&self) -> PoolLimits {
        *self.shared.limits.read()
    }

    /// Whether [`ResourcePool::shutdown`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Acquire a resource, waiting at most the configured `queue_timeout`.
    ///
    /// # Errors
    ///
    /// See [`ResourcePool::acquire_until`].
    pub async fn acquire(&self) -> Result<PooledResource<F>, SubstrateError> {
        let timeout = self.shared.limits.read().queue_timeout;
        self.acquire_until(Deadline::after(timeout)).await
    }

    /// Acquire a resource before `deadline`.
    ///
    /// Tries the idle queue first, then reserves a size slot (or picks up a
    /// resource returned meanwhile), then a connect slot, then builds a new
    /// resource. Dropping the returned future at any point releases whatever
    /// slots it held.
    ///
    /// # Errors
    ///
    /// - `SubstrateError::PoolExhausted` if no slot frees up before `deadline`
    /// - `SubstrateError::ConnectionFailed` if the factory fails
    /// - `SubstrateError::PoolClosed` if the pool has been shut down
    pub async fn acquire_until(&self, deadline: Deadline) -> Result<PooledResource<F>, SubstrateError> {
        let result = self.acquire_inner(deadline).await;
        match &result {
            Ok(handle) => {
                tracing::debug!(pool = %self.shared.name, resource = %handle.id(), "resource acquired");
            }
            Err(err) => {
                tracing::warn!(pool = %self.shared.name, error = %err, "resource acquisition failed");
            }
        }
        result
    }

    async fn acquire_inner(&self, deadline: Deadline) -> Result<PooledResource<F>, SubstrateError> {
        let shared = &*self.shared;
        if self.is_closed() {
            return Err(shared.closed_error());
        }
        if let Some(idle) = shared.try_pop_idle() {
            return Ok(self.check_out(idle));
        }

        let size_slot = match tokio::time::timeout_at(deadline.instant(), self.wait_for_slot()).await {
            Ok(SlotWait::Reserved(permit)) => permit,
            Ok(SlotWait::Reused(idle)) => return Ok(self.check_out(idle)),
            Ok(SlotWait::Closed) => return Err(shared.closed_error()),
            Err(_) => return Err(shared.exhausted()),
        };

        let connecting = tokio::time::timeout_at(deadline.instant(), shared.connecting_semaphore.permit())
            .await
            .map_err(|_| shared.exhausted())?;

        tracing::debug!(pool = %shared.name, "creating resource");
        let created = shared.factory.create().await;
        drop(connecting);
        let resource = created.map_err(|source| SubstrateError::ConnectionFailed {
            pool: shared.name.clone(),
            source,
        })?;

        size_slot.forget();
        shared.counters.created.fetch_add(1, Ordering::Relaxed);
        let idle = Idle {
            id: Uuid::new_v4(),
            resource,
        };
        if self.is_closed() {
            shared.destroy(idle);
            return Err(shared.closed_error());
        }
        Ok(self.check_out(idle))
    }

    /// Reserve a size slot, or take a resource returned while waiting.
    ///
    /// The size-semaphore wait is created once, so wake-ups from returned
    /// resources keep this waiter's place in the FIFO queue.
    async fn wait_for_slot(&self) -> SlotWait<'_, F::Resource> {
        let shared = &*self.shared;
        let permit = shared.size_semaphore.permit();
        tokio::pin!(permit);
        loop {
            let returned = shared.returned.notified();
            tokio::pin!(returned);
            returned.as_mut().enable();

            if self.is_closed() {
                return SlotWait::Closed;
            }
            if let Some(idle) = shared.try_pop_idle() {
                return SlotWait::Reused(idle);
            }

            tokio::select! {
                biased;
                permit = &mut permit => return SlotWait::Reserved(permit),
                () = &mut returned => {}
            }
        }
    }

    fn check_out(&self, idle: Idle<F::Resource>) -> PooledResource<F> {
        self.shared.counters.checked_out.fetch_add(1, Ordering::Relaxed);
        PooledResource {
            idle: Some(idle),
            pool: Arc::clone(&self.shared),
        }
    }

    /// Resize the pool.
    ///
    /// Shrinking does not destroy live resources; new ones are not created
    /// until the live count drops below the new `max_size`.
    ///
    /// # Errors
    ///
    /// Returns `SubstrateError::InvalidArgument` if `limits` is invalid.
    pub fn reconfigure(&self, limits: PoolLimits) -> Result<(), SubstrateError> {
        limits.validate()?;
        let shared = &*self.shared;
        shared.size_semaphore.reset_capacity(limits.max_size)?;
        shared.connecting_semaphore.reset_capacity(limits.connecting_limit)?;
        *shared.limits.write() = limits;
        tracing::info!(
            pool = %shared.name,
            max_size = limits.max_size,
            connecting_limit = limits.connecting_limit,
            "resource pool reconfigured"
        );
        Ok(())
    }

    /// Close the pool and destroy every idle resource.
    ///
    /// Checked-out resources are destroyed when their handles drop. Pending
    /// and future acquisitions fail with `PoolClosed`. Returns the number of
    /// resources destroyed now.
    pub fn shutdown(&self) -> usize {
        let shared = &*self.shared;
        shared.closed.store(true, Ordering::Release);
        let destroyed = shared.drain_idle();
        shared.returned.notify_waiters();
        tracing::info!(pool = %shared.name, destroyed, "resource pool shut down");
        destroyed
    }

    /// Current bookkeeping.
    pub fn stats(&self) -> PoolStats {
        let shared = &*self.shared;
        PoolStats {
            max_size: shared.size_semaphore.capacity(),
            connecting_limit: shared.connecting_semaphore.capacity(),
            idle: shared.idle_rx.len(),
            checked_out: shared.counters.checked_out.load(Ordering::Relaxed),
            created: shared.counters.created.load(Ordering::Relaxed),
            destroyed: shared.counters.destroyed.load(Ordering::Relaxed),
            size_slots_in_use: shared.size_semaphore.in_use(),
        }
    }
}

/// Handle to a checked-out resource.
///
/// Dropping it returns the resource to the idle queue, or destroys it if the
/// pool has been shut down.
pub struct PooledResource<F: ResourceFactory> {
    idle: Option<Idle<F::Resource>>,
    pool: Arc<PoolShared<F>>,
}

impl<F: ResourceFactory> PooledResource<F> {
    /// Identity of the underlying resource, stable across reuse.
    pub fn id(&self) -> Uuid {
        self.idle.as_ref().map_or_else(Uuid::nil, |idle| idle.id)
    }

    /// Name of the owning pool.
    pub fn pool_name(&self) -> &str {
        &self.pool.name
    }

    /// Destroy the resource instead of returning it (e.g. a broken
    /// connection). Its size slot is released.
    pub fn discard(mut self) {
        if let Some(idle) = self.idle.take() {
            self.pool.counters.checked_out.fetch_sub(1, Ordering::Relaxed);
            self.pool.destroy(idle);
        }
    }

    fn slot(&self) -> &Idle<F::Resource> {
        self.idle
            .as_ref()
            .expect("resource is present until the handle is consumed")
    }
}

impl<F: ResourceFactory> Deref for PooledResource<F> {
    type Target = F::Resource;

    fn deref(&self) -> &Self::Target {
        &self.slot().resource
    }
}

impl<F: ResourceFactory> DerefMut for PooledResource<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self
            .idle
            .as_mut()
            .expect("resource is present until the handle is consumed")
            .resource
    }
}

impl<F: ResourceFactory> fmt::Debug for PooledResource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("pool", &self.pool.name)
            .field("id", &self.id())
            .finish()
    }
}

impl<F: ResourceFactory> Drop for PooledResource<F> {
    fn drop(&mut self) {
        if let Some(idle) = self.idle.take() {
            self.pool.counters.checked_out.fetch_sub(1, Ordering::Relaxed);
            self.pool.push_idle(idle);
        }
    }
}
