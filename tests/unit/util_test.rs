//! Tests for utility types

use prometheus_substrate::util::{init_tracing, Deadline};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_deadline_counts_down() {
    let deadline = Deadline::after(Duration::from_secs(1));
    assert!(!deadline.is_reached());

    tokio::time::advance(Duration::from_millis(400)).await;
    assert_eq!(deadline.time_left(), Duration::from_millis(600));

    tokio::time::advance(Duration::from_millis(600)).await;
    assert!(deadline.is_reached());
}

#[tokio::test]
async fn test_deadline_saturates() {
    let deadline = Deadline::after(Duration::MAX);
    assert!(!deadline.is_reached());
    assert!(deadline.time_left() > Duration::from_secs(86_400));
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    tracing::info!("tracing initialized twice without panicking");
}
