//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Handle, Runtime};

use crate::core::{Spawn, TaskHandle};

/// Tokio-based spawner that executes tasks on a multi-threaded runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawner {
    handle: Handle,
    /// Keeps a runtime built by this spawner alive. Drop the last clone
    /// outside of async code.
    _runtime: Option<Arc<Runtime>>,
}

impl TokioSpawner {
    /// Create a spawner from an existing runtime handle.
    pub const fn new(handle: Handle) -> Self {
        Self {
            handle,
            _runtime: None,
        }
    }

    /// Spawner for the runtime the caller is running on.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Create a spawner owning a new multi-threaded runtime with
    /// `worker_threads` workers.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the runtime cannot be built.
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("substrate-worker")
            .enable_all()
            .build()?;
        tracing::info!(worker_threads, "tokio spawner runtime started");
        Ok(Self {
            handle: runtime.handle().clone(),
            _runtime: Some(Arc::new(runtime)),
        })
    }

    /// Like [`TokioSpawner::with_worker_threads`] with one worker per CPU.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the runtime cannot be built.
    pub fn with_default_workers() -> Result<Self, std::io::Error> {
        Self::with_worker_threads(num_cpus::get())
    }

    /// Underlying runtime handle.
    pub const fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        TaskHandle::launch(&self.handle, fut)
    }
}
