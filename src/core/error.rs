//! Error types for admission control, pooling and caching operations.

use thiserror::Error;

/// Errors produced by substrate components.
#[derive(Debug, Error)]
pub enum SubstrateError {
    /// A capacity or configuration value was rejected at construction/resize.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// No resource became available before the deadline.
    #[error("pool `{pool}` exhausted: no resource available before deadline")]
    PoolExhausted {
        /// Pool identifier.
        pool: String,
    },
    /// The pool has been shut down.
    #[error("pool `{pool}` is closed")]
    PoolClosed {
        /// Pool identifier.
        pool: String,
    },
    /// Constructing a new native resource failed.
    #[error("pool `{pool}` failed to create a resource: {source}")]
    ConnectionFailed {
        /// Pool identifier.
        pool: String,
        /// Underlying factory failure.
        #[source]
        source: anyhow::Error,
    },
    /// The owning task was cancelled while suspended.
    #[error("cancelled")]
    Cancelled,
    /// A spawned task panicked or was lost by the runtime.
    #[error("task failed: {0}")]
    TaskFailed(String),
    /// A cache refresh failed; the previous snapshot stays in place.
    #[error("cache `{cache}` update failed: {source}")]
    UpdateFailed {
        /// Cache name.
        cache: String,
        /// Underlying data source failure.
        #[source]
        source: anyhow::Error,
    },
}

impl SubstrateError {
    /// Shorthand for [`SubstrateError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether a caller may reasonably retry the failed operation.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PoolExhausted { .. } | Self::ConnectionFailed { .. } | Self::UpdateFailed { .. }
        )
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
