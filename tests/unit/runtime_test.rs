//! Tests for the Tokio spawner

use prometheus_substrate::core::{Spawn, SubstrateError, TaskState};
use prometheus_substrate::runtime::TokioSpawner;
use std::time::Duration;

#[test]
fn test_spawner_owns_runtime() {
    let spawner = TokioSpawner::with_worker_threads(2).unwrap();
    let handle = spawner.spawn(async { 21 * 2 });
    let value = spawner.handle().block_on(handle.join()).unwrap();
    assert_eq!(value, 42);
}

#[tokio::test]
async fn test_spawn_on_current_runtime() {
    let spawner = TokioSpawner::current();
    let handle = spawner.spawn(async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        "done"
    });
    assert_eq!(handle.join().await.unwrap(), "done");
}

#[tokio::test]
async fn test_panicking_task_reports_failure() {
    let spawner = TokioSpawner::current();
    let handle = spawner.spawn(async {
        panic!("boom");
    });
    let result: Result<(), _> = handle.join().await;
    assert!(matches!(result, Err(SubstrateError::TaskFailed(_))));
}

#[tokio::test]
async fn test_cancelled_task_state() {
    let spawner = TokioSpawner::current();
    let handle = spawner.spawn(async {
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
    tokio::task::yield_now().await;
    handle.cancel();
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(handle.state(), TaskState::Cancelled);
    assert!(handle.is_finished());
    assert!(matches!(handle.join().await, Err(SubstrateError::Cancelled)));
}

#[test]
fn test_spawner_clone_keeps_runtime_alive() {
    let spawner = TokioSpawner::with_worker_threads(1).unwrap();
    let clone = spawner.clone();
    drop(spawner);

    let handle = clone.spawn(async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        7
    });
    assert_eq!(clone.handle().block_on(handle.join()).unwrap(), 7);
}
