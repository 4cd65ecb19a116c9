//! Tests for error types

use prometheus_substrate::core::{AppResult, SubstrateError};

#[test]
fn test_error_display() {
    let err = SubstrateError::PoolExhausted {
        pool: "redis".into(),
    };
    assert_eq!(
        err.to_string(),
        "pool `redis` exhausted: no resource available before deadline"
    );

    let err = SubstrateError::PoolClosed {
        pool: "redis".into(),
    };
    assert_eq!(err.to_string(), "pool `redis` is closed");

    let err = SubstrateError::invalid("capacity must be greater than 0");
    assert_eq!(
        err.to_string(),
        "invalid argument: capacity must be greater than 0"
    );
}

#[test]
fn test_error_recoverability() {
    assert!(SubstrateError::PoolExhausted { pool: "p".into() }.is_recoverable());
    assert!(SubstrateError::UpdateFailed {
        cache: "c".into(),
        source: anyhow::anyhow!("timeout"),
    }
    .is_recoverable());
    assert!(!SubstrateError::PoolClosed { pool: "p".into() }.is_recoverable());
    assert!(!SubstrateError::Cancelled.is_recoverable());
    assert!(!SubstrateError::TaskFailed("panic".into()).is_recoverable());
}

#[test]
fn test_error_converts_into_app_result() {
    fn lookup() -> AppResult<()> {
        let outcome: Result<(), SubstrateError> = Err(SubstrateError::Cancelled);
        outcome?;
        Ok(())
    }
    let err = lookup().unwrap_err();
    assert!(err.downcast_ref::<SubstrateError>().is_some());
}
