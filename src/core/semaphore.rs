//! Counting semaphore with FIFO hand-off.
//!
//! Used as an admission gate: the resource pool caps total resources with one
//! instance and concurrent connects with another.
//!
//! All counters and the wait queue live behind a single `parking_lot::Mutex`,
//! so only one mutation is ever in flight. Waiting tasks suspend on a
//! [`ResumeToken`]; `release` transfers the permit directly to the head of the
//! queue, and no permit becomes visible to `try_acquire` while anyone waits.
//!
//! # Examples
//!
//! ```
//! use prometheus_substrate::core::Semaphore;
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let sem = Semaphore::new(1).unwrap();
//!     sem.acquire().await;
//!     assert!(!sem.try_acquire());
//!     sem.release();
//!     assert!(sem.try_acquire());
//! });
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::Mutex;

use crate::core::task::ResumeToken;
use crate::core::SubstrateError;

/// Counting semaphore with bounded, reconfigurable capacity.
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<SemState>,
}

#[derive(Debug)]
struct SemState {
    capacity: usize,
    /// Permits currently held. May exceed `capacity` after a shrink.
    acquired: usize,
    waiters: VecDeque<ResumeToken>,
}

impl SemState {
    /// Grant free permits to queued waiters, oldest first.
    ///
    /// Returns the tokens to signal once the lock is dropped.
    fn hand_off(&mut self) -> Vec<ResumeToken> {
        let mut granted = Vec::new();
        while self.acquired < self.capacity {
            let Some(token) = self.waiters.pop_front() else {
                break;
            };
            self.acquired += 1;
            granted.push(token);
        }
        granted
    }
}

fn resume_all(tokens: Vec<ResumeToken>) {
    for token in tokens {
        token.signal();
    }
}

impl Semaphore {
    /// Create a semaphore with `capacity` permits.
    ///
    /// # Errors
    ///
    /// Returns `SubstrateError::InvalidArgument` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, SubstrateError> {
        if capacity == 0 {
            return Err(SubstrateError::invalid("semaphore capacity must be greater than 0"));
        }
        Ok(Self {
            state: Mutex::new(SemState {
                capacity,
                acquired: 0,
                waiters: VecDeque::new(),
            }),
        })
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Permits that can be taken right now.
    pub fn available(&self) -> usize {
        let state = self.state.lock();
        state.capacity.saturating_sub(state.acquired)
    }

    /// Permits currently held, including any above a reduced capacity.
    pub fn in_use(&self) -> usize {
        self.state.lock().acquired
    }

    /// Number of suspended acquirers.
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Take one permit, suspending the current task until one is available.
    ///
    /// There is no timeout; wrap the future in `tokio::time::timeout` or
    /// [`crate::core::cancellable`] for a bounded wait. Dropping the future
    /// before it completes never leaks a permit.
    pub const fn acquire(&self) -> Acquire<'_> {
        Acquire {
            sem: self,
            waiter: None,
        }
    }

    /// Take one permit if it is available without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        if state.waiters.is_empty() && state.acquired < state.capacity {
            state.acquired += 1;
            true
        } else {
            false
        }
    }

    /// Return one permit, handing it to the oldest waiter if there is one.
    pub fn release(&self) {
        let granted = {
            let mut state = self.state.lock();
            if state.acquired == 0 {
                tracing::warn!("semaphore released without a matching acquire");
                return;
            }
            state.acquired -= 1;
            state.hand_off()
        };
        resume_all(granted);
    }

    /// Take one permit and wrap it in a guard that releases on drop.
    pub async fn permit(&self) -> SemaphorePermit<'_> {
        self.acquire().await;
        SemaphorePermit { sem: self }
    }

    /// Non-suspending variant of [`Semaphore::permit`].
    pub fn try_permit(&self) -> Option<SemaphorePermit<'_>> {
        // The guard releases on drop, so only build it once a unit is held.
        if self.try_acquire() {
            Some(SemaphorePermit { sem: self })
        } else {
            None
        }
    }

    /// Change the capacity.
    ///
    /// Growing wakes waiters for the new permits. Shrinking below the number
    /// of held permits blocks new acquisitions until enough are released.
    ///
    /// # Errors
    ///
    /// Returns `SubstrateError::InvalidArgument` if `new_capacity` is zero.
    pub fn reset_capacity(&self, new_capacity: usize) -> Result<(), SubstrateError> {
        if new_capacity == 0 {
            return Err(SubstrateError::invalid("semaphore capacity must be greater than 0"));
        }
        let granted = {
            let mut state = self.state.lock();
            tracing::debug!(
                old = state.capacity,
                new = new_capacity,
                acquired = state.acquired,
                "semaphore capacity reset"
            );
            state.capacity = new_capacity;
            state.hand_off()
        };
        resume_all(granted);
        Ok(())
    }
}

/// Future returned by [`Semaphore::acquire`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Acquire<'a> {
    sem: &'a Semaphore,
    waiter: Option<ResumeToken>,
}

impl Future for Acquire<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if let Some(token) = &this.waiter {
            return match token.poll_resumed(cx) {
                Poll::Ready(()) => {
                    this.waiter = None;
                    Poll::Ready(())
                }
                Poll::Pending => Poll::Pending,
            };
        }

        let mut state = this.sem.state.lock();
        if state.waiters.is_empty() && state.acquired < state.capacity {
            state.acquired += 1;
            return Poll::Ready(());
        }
        let token = ResumeToken::new();
        // Registers the waker; cannot be signaled before it is queued.
        let _ = token.poll_resumed(cx);
        state.waiters.push_back(token.clone());
        this.waiter = Some(token);
        Poll::Pending
    }
}

impl Drop for Acquire<'_> {
    fn drop(&mut self) {
        let Some(token) = self.waiter.take() else {
            return;
        };
        let granted = {
            let mut state = self.sem.state.lock();
            if let Some(pos) = state.waiters.iter().position(|w| w.same_as(&token)) {
                state.waiters.remove(pos);
                return;
            }
            // Out of the queue means a permit was handed to us; pass it on.
            state.acquired -= 1;
            state.hand_off()
        };
        resume_all(granted);
    }
}

/// RAII permit; released exactly once when dropped.
#[derive(Debug)]
#[must_use = "dropping the permit releases it immediately"]
pub struct SemaphorePermit<'a> {
    sem: &'a Semaphore,
}

impl SemaphorePermit<'_> {
    /// Keep the permit acquired without a guard. The caller becomes
    /// responsible for a later [`Semaphore::release`].
    pub fn forget(self) {
        std::mem::forget(self);
    }
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}
