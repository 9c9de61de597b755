//! Mutual exclusion for cooperative async tasks
//!
//! Waiters are served strictly in the order they called [`AsyncMutex::lock`];
//! there is no timeout and a queued waiter cannot be withdrawn other than by
//! dropping its future.

use std::future::Future;

use tokio::sync::{Mutex, MutexGuard};

/// FIFO async mutex serializing dispatched actions
#[derive(Debug, Default)]
pub struct AsyncMutex {
    inner: Mutex<()>,
}

/// Proof of holding an [`AsyncMutex`]; releases the lock when dropped
#[derive(Debug)]
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct Unlock<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl Unlock<'_> {
    /// Release the lock explicitly
    pub fn unlock(self) {}
}

impl AsyncMutex {
    /// Create an unlocked mutex
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until every earlier holder has released the lock, then take it
    pub async fn lock(&self) -> Unlock<'_> {
        Unlock {
            _guard: self.inner.lock().await,
        }
    }

    /// Take the lock only if nobody holds or waits for it
    pub fn try_lock(&self) -> Option<Unlock<'_>> {
        self.inner
            .try_lock()
            .ok()
            .map(|guard| Unlock { _guard: guard })
    }

    /// Whether the lock is currently held
    pub fn is_locked(&self) -> bool {
        self.try_lock().is_none()
    }

    /// Run `action` while holding the lock.
    ///
    /// The lock is released on every exit path: normal completion, an `Err`
    /// returned by the action, a panic unwinding through it, or the returned
    /// future being dropped.
    pub async fn dispatch<F, Fut, T>(&self, action: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _unlock = self.lock().await;
        action().await
    }
}
