//! Integration tests for ResourcePool
//!
//! These tests validate real-world pool behavior including:
//! - Reuse of returned resources by identity
//! - Size and connect fan-out limits under concurrency
//! - Deadline-bounded acquisition
//! - Factory failures releasing their slots
//! - Cancellation at every suspension point
//! - Shutdown and bookkeeping reconciliation

use anyhow::anyhow;
use async_trait::async_trait;
use futures::future::join_all;
use prometheus_substrate::core::{
    PoolLimits, ResourceFactory, ResourcePool, Spawn, SubstrateError,
};
use prometheus_substrate::runtime::TokioSpawner;
use prometheus_substrate::util::Deadline;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// TEST FACTORY
// ============================================================================

/// Fake client with observable construction.
#[derive(Debug)]
struct Client {
    serial: u32,
}

#[derive(Default)]
struct Tally {
    next_serial: AtomicU32,
    constructing: AtomicUsize,
    peak_constructing: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    fail: AtomicBool,
}

#[derive(Clone)]
struct ClientFactory {
    tally: Arc<Tally>,
    connect_delay: Duration,
}

impl ClientFactory {
    fn new(connect_delay: Duration) -> Self {
        Self {
            tally: Arc::new(Tally::default()),
            connect_delay,
        }
    }
}

#[async_trait]
impl ResourceFactory for ClientFactory {
    type Resource = Client;

    async fn create(&self) -> anyhow::Result<Client> {
        let tally = &self.tally;
        let now = tally.constructing.fetch_add(1, Ordering::SeqCst) + 1;
        tally.peak_constructing.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.connect_delay).await;
        tally.constructing.fetch_sub(1, Ordering::SeqCst);

        if tally.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        let live = tally.live.fetch_add(1, Ordering::SeqCst) + 1;
        tally.peak_live.fetch_max(live, Ordering::SeqCst);
        Ok(Client {
            serial: tally.next_serial.fetch_add(1, Ordering::SeqCst),
        })
    }

    fn destroy(&self, _resource: Client) {
        self.tally.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn limits(max_size: usize, connecting_limit: usize) -> PoolLimits {
    PoolLimits {
        max_size,
        connecting_limit,
        queue_timeout: Duration::from_secs(5),
    }
}

fn make_pool(
    max_size: usize,
    connecting_limit: usize,
    connect_delay: Duration,
) -> (ResourcePool<ClientFactory>, Arc<Tally>) {
    let factory = ClientFactory::new(connect_delay);
    let tally = Arc::clone(&factory.tally);
    let pool = ResourcePool::new("test-pool", limits(max_size, connecting_limit), factory)
        .unwrap();
    (pool, tally)
}

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_returned_resource_is_reused() {
    let (pool, tally) = make_pool(4, 1, Duration::ZERO);

    let first = pool.acquire().await.unwrap();
    let id = first.id();
    let serial = first.serial;
    drop(first);

    let second = pool.acquire().await.unwrap();
    assert_eq!(second.id(), id);
    assert_eq!(second.serial, serial);
    assert_eq!(pool.stats().created, 1);
    assert_eq!(tally.live.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_third_acquirer_gets_released_instance() {
    let (pool, tally) = make_pool(2, 1, Duration::from_millis(20));
    let deadline = Deadline::after(Duration::from_secs(5));

    let mut handles = Vec::new();
    for hold_ms in [50_u64, 80, 10] {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let handle = pool.acquire_until(deadline).await.unwrap();
            let got = (handle.id(), Instant::now());
            tokio::time::sleep(Duration::from_millis(hold_ms)).await;
            drop(handle);
            got
        }));
    }

    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let (first_id, first_at) = results[0];
    let (second_id, second_at) = results[1];
    let (third_id, third_at) = results[2];

    assert_ne!(first_id, second_id);
    assert!(third_id == first_id || third_id == second_id);
    assert!(third_at > first_at && third_at > second_at);
    assert_eq!(pool.stats().created, 2);
    // Connects were serialized by the fan-out limit.
    assert_eq!(tally.peak_constructing.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_two_handles_share_a_resource() {
    const MAX_SIZE: usize = 4;
    let (pool, tally) = make_pool(MAX_SIZE, 2, Duration::from_millis(1));
    let in_use = Arc::new(Mutex::new(HashSet::new()));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                let handle = pool.acquire().await.unwrap();
                let id = handle.id();
                assert!(in_use.lock().unwrap().insert(id), "resource {id} handed out twice");
                tokio::time::sleep(Duration::from_millis(1)).await;
                in_use.lock().unwrap().remove(&id);
                drop(handle);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = pool.stats();
    assert!(tally.peak_live.load(Ordering::SeqCst) <= MAX_SIZE);
    assert!(tally.peak_constructing.load(Ordering::SeqCst) <= 2);
    assert!(stats.created <= MAX_SIZE as u64);
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.size_slots_in_use, stats.idle);
}

#[tokio::test(start_paused = true)]
async fn test_saturated_pool_fails_at_deadline() {
    let (pool, _tally) = make_pool(1, 1, Duration::ZERO);
    let _held = pool.acquire().await.unwrap();

    let started = Instant::now();
    let result = pool
        .acquire_until(Deadline::after(Duration::from_millis(100)))
        .await;

    assert!(matches!(result, Err(SubstrateError::PoolExhausted { .. })));
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_millis(150));
    assert_eq!(pool.stats().size_slots_in_use, 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_fan_out_timeout_releases_size_slot() {
    let (pool, _tally) = make_pool(2, 1, Duration::from_millis(200));

    let builder_pool = pool.clone();
    let builder = tokio::spawn(async move { builder_pool.acquire().await.map(|h| h.id()) });
    settle().await;

    // Size slot free, connect slot taken by the builder.
    let result = pool
        .acquire_until(Deadline::after(Duration::from_millis(50)))
        .await;
    assert!(matches!(result, Err(SubstrateError::PoolExhausted { .. })));
    assert_eq!(pool.stats().size_slots_in_use, 1);

    builder.await.unwrap().unwrap();
    let stats = pool.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.size_slots_in_use, 1);
}

#[tokio::test]
async fn test_connection_failure_releases_slots() {
    let (pool, tally) = make_pool(1, 1, Duration::ZERO);
    tally.fail.store(true, Ordering::SeqCst);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, SubstrateError::ConnectionFailed { .. }));
    assert!(err.is_recoverable());
    assert_eq!(pool.stats().size_slots_in_use, 0);
    assert_eq!(pool.stats().created, 0);

    tally.fail.store(false, Ordering::SeqCst);
    let handle = pool.acquire().await.unwrap();
    assert_eq!(handle.serial, 0);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_slot() {
    let (pool, _tally) = make_pool(1, 1, Duration::ZERO);
    let held = pool.acquire().await.unwrap();
    let held_id = held.id();

    let spawner = TokioSpawner::current();
    let waiter_pool = pool.clone();
    let waiter = spawner.spawn(async move { waiter_pool.acquire().await.map(|h| h.id()) });
    settle().await;

    waiter.cancel();
    assert!(matches!(waiter.join().await, Err(SubstrateError::Cancelled)));
    assert_eq!(pool.stats().size_slots_in_use, 1);

    drop(held);
    let again = pool.acquire().await.unwrap();
    assert_eq!(again.id(), held_id);
    assert_eq!(pool.stats().created, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_construction() {
    let (pool, tally) = make_pool(1, 1, Duration::from_secs(10));

    let spawner = TokioSpawner::current();
    let builder_pool = pool.clone();
    let builder = spawner.spawn(async move { builder_pool.acquire().await.map(|h| h.id()) });
    settle().await;
    assert_eq!(tally.constructing.load(Ordering::SeqCst), 1);

    builder.cancel();
    assert!(matches!(builder.join().await, Err(SubstrateError::Cancelled)));

    let stats = pool.stats();
    assert_eq!(stats.size_slots_in_use, 0);
    assert_eq!(stats.created, 0);
    assert_eq!(stats.checked_out, 0);
}

#[tokio::test]
async fn test_shutdown_reconciles_bookkeeping() {
    let (pool, tally) = make_pool(3, 3, Duration::ZERO);
    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    let c = pool.acquire().await.unwrap();
    drop(a);
    drop(b);

    let stats = pool.stats();
    assert_eq!(stats.created, stats.destroyed + stats.idle as u64 + stats.checked_out as u64);
    assert_eq!((stats.idle, stats.checked_out), (2, 1));

    assert_eq!(pool.shutdown(), 2);
    assert!(pool.is_closed());
    let stats = pool.stats();
    assert_eq!(stats.destroyed, 2);
    assert_eq!(stats.size_slots_in_use, 1);

    drop(c);
    let stats = pool.stats();
    assert_eq!(stats.created, stats.destroyed);
    assert_eq!(stats.size_slots_in_use, 0);
    assert_eq!(tally.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_shutdown_wakes_waiters() {
    let (pool, _tally) = make_pool(1, 1, Duration::ZERO);
    let held = pool.acquire().await.unwrap();

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await.map(|h| h.id()) });
    settle().await;

    pool.shutdown();
    assert!(matches!(
        waiter.await.unwrap(),
        Err(SubstrateError::PoolClosed { .. })
    ));
    drop(held);
    assert_eq!(pool.stats().size_slots_in_use, 0);
}

#[tokio::test]
async fn test_discard_replaces_resource() {
    let (pool, tally) = make_pool(1, 1, Duration::ZERO);
    let broken = pool.acquire().await.unwrap();
    let broken_id = broken.id();
    broken.discard();

    let fresh = pool.acquire().await.unwrap();
    assert_ne!(fresh.id(), broken_id);
    assert_eq!(pool.stats().destroyed, 1);
    assert_eq!(tally.live.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reconfigure_grows_pool_for_waiters() {
    let (pool, _tally) = make_pool(1, 1, Duration::ZERO);
    let _held = pool.acquire().await.unwrap();

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move { waiter_pool.acquire().await.map(|h| h.id()) });
    settle().await;

    pool.reconfigure(limits(2, 1)).unwrap();
    assert!(waiter.await.unwrap().is_ok());
    assert_eq!(pool.limits().max_size, 2);
    assert_eq!(pool.stats().created, 2);

    assert!(pool.reconfigure(limits(0, 1)).is_err());
    assert_eq!(pool.limits().max_size, 2);
}

#[tokio::test]
async fn test_slot_waiters_keep_fifo_order_across_returns() {
    let (pool, _tally) = make_pool(1, 1, Duration::ZERO);
    let held = pool.acquire().await.unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut waiters = Vec::new();
    for name in ["first", "second"] {
        let pool = pool.clone();
        let order = Arc::clone(&order);
        waiters.push(tokio::spawn(async move {
            let handle = pool.acquire().await.unwrap();
            order.lock().unwrap().push(name);
            drop(handle);
        }));
        settle().await;
    }

    // The return wakes the first waiter, but a newcomer takes the resource.
    drop(held);
    let newcomer = pool.acquire().await.unwrap();
    settle().await;
    // Frees the only size slot; the longest waiter must get it.
    newcomer.discard();

    for waiter in waiters {
        waiter.await.unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    assert_eq!(pool.stats().created, 2);
}
