//! Task scheduling contract consumed by the semaphore and the resource pool.
//!
//! A task is any `Future` handed to a [`Spawn`] implementation. The contract is
//! deliberately small:
//!
//! - [`Spawn::spawn`] schedules work and returns a [`TaskHandle`] immediately.
//! - [`suspend_current_task`] parks the calling task until its [`ResumeToken`]
//!   is signaled by someone else. Only the first signal resumes it.
//! - [`TaskHandle::join`] awaits another task and propagates its failure or
//!   cancellation.
//! - Cancellation is cooperative. A cancelled task is dropped at its current
//!   suspension point, so guards it holds (semaphore permits, pool slots) run
//!   their release logic before [`TaskHandle::join`] reports
//!   [`SubstrateError::Cancelled`].

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::SubstrateError;

/// Execution state of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Scheduled but not yet polled.
    Created,
    /// Currently being polled by a worker.
    Running,
    /// Waiting at a suspension point.
    Suspended,
    /// Completed with a result.
    Finished,
    /// Stopped by cancellation before completing.
    Cancelled,
    /// Panicked or was lost by the runtime.
    Failed,
}

impl TaskState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Suspended => 2,
            Self::Finished => 3,
            Self::Cancelled => 4,
            Self::Failed => 5,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Suspended,
            3 => Self::Finished,
            4 => Self::Cancelled,
            _ => Self::Failed,
        }
    }

    /// Whether the task can no longer make progress.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Failed)
    }
}

/// Abstraction for spawning tasks on a runtime.
pub trait Spawn {
    /// Schedule `fut` on a worker and return a handle to it without waiting.
    fn spawn<F>(&self, fut: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static;
}

/// Owning handle to a spawned task.
///
/// Dropping the handle detaches the task; it keeps running to completion.
#[derive(Debug)]
pub struct TaskHandle<T> {
    join: JoinHandle<Option<T>>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> TaskHandle<T> {
    /// Spawn `fut` on the given Tokio runtime with state tracking and
    /// cooperative cancellation wired in.
    pub(crate) fn launch<F>(runtime: &tokio::runtime::Handle, fut: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(TaskState::Created.as_u8()));
        let cancel = CancellationToken::new();
        let observed = cancel.clone();
        let work = async move {
            tokio::select! {
                biased;
                () = observed.cancelled() => None,
                out = fut => Some(out),
            }
        };
        let join = runtime.spawn(Tracked {
            inner: Box::pin(work),
            state: Arc::clone(&state),
        });
        Self {
            join,
            state,
            cancel,
        }
    }
}

impl<T> TaskHandle<T> {
    /// Last observed execution state.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Request cooperative cancellation.
    ///
    /// The task observes it at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that fires when this task is cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the task has stopped running.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the task and return its result.
    ///
    /// # Errors
    ///
    /// - `SubstrateError::Cancelled` if the task was cancelled
    /// - `SubstrateError::TaskFailed` if the task panicked
    pub async fn join(self) -> Result<T, SubstrateError> {
        match self.join.await {
            Ok(Some(out)) => Ok(out),
            Ok(None) => Err(SubstrateError::Cancelled),
            Err(err) if err.is_cancelled() => {
                self.state
                    .store(TaskState::Cancelled.as_u8(), Ordering::Release);
                Err(SubstrateError::Cancelled)
            }
            Err(err) => {
                self.state.store(TaskState::Failed.as_u8(), Ordering::Release);
                Err(SubstrateError::TaskFailed(err.to_string()))
            }
        }
    }
}

/// Future wrapper recording `Running`/`Suspended`/terminal transitions.
struct Tracked<F> {
    inner: Pin<Box<F>>,
    state: Arc<AtomicU8>,
}

impl<T, F> Future for Tracked<F>
where
    F: Future<Output = Option<T>>,
{
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        this.state.store(TaskState::Running.as_u8(), Ordering::Release);
        let polled = this.inner.as_mut().poll(cx);
        let next = match &polled {
            Poll::Pending => TaskState::Suspended,
            Poll::Ready(Some(_)) => TaskState::Finished,
            Poll::Ready(None) => TaskState::Cancelled,
        };
        this.state.store(next.as_u8(), Ordering::Release);
        polled
    }
}

/// Wake-up token with single-resume semantics.
///
/// A suspended task is resumed by the first [`ResumeToken::signal`]; repeated
/// signals are harmless.
#[derive(Debug, Clone, Default)]
pub struct ResumeToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    signaled: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl ResumeToken {
    /// Create an unsignaled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the token. Returns `true` only for the call that resumed it.
    pub fn signal(&self) -> bool {
        if self.inner.signaled.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(waker) = self.inner.waker.lock().take() {
            waker.wake();
        }
        true
    }

    /// Whether the token has been signaled.
    pub fn is_signaled(&self) -> bool {
        self.inner.signaled.load(Ordering::Acquire)
    }

    /// Whether both tokens refer to the same suspension.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn poll_resumed(&self, cx: &Context<'_>) -> Poll<()> {
        if self.is_signaled() {
            return Poll::Ready(());
        }
        {
            let mut slot = self.inner.waker.lock();
            match slot.as_ref() {
                Some(waker) if waker.will_wake(cx.waker()) => {}
                _ => *slot = Some(cx.waker().clone()),
            }
        }
        // Re-check: a signal racing with registration must not be lost.
        if self.is_signaled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Future returned by [`suspend_current_task`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Suspend<'a> {
    token: &'a ResumeToken,
}

impl Future for Suspend<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.token.poll_resumed(cx)
    }
}

/// Yield the current task until `token` is signaled.
pub const fn suspend_current_task(token: &ResumeToken) -> Suspend<'_> {
    Suspend { token }
}

/// Race `fut` against `token`.
///
/// # Errors
///
/// Returns `SubstrateError::Cancelled` if the token fires first; `fut` is
/// dropped at its current suspension point.
pub async fn cancellable<F>(token: &CancellationToken, fut: F) -> Result<F::Output, SubstrateError>
where
    F: Future,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(SubstrateError::Cancelled),
        out = fut => Ok(out),
    }
}
