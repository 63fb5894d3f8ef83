//! Single-assignment result slot.
//!
//! One producer fills a [`ResultCell`] exactly once; any number of threads
//! can block on [`ResultCell::get`] (or `.await` [`ResultCell::wait`]) and
//! all of them observe the same value.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use thiserror::Error;

/// Returned when a cell that already holds a value is set again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("result cell already holds a value")]
pub struct DoubleSetError;

struct Slot<T> {
    value: Option<T>,
    wakers: Vec<Waker>,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    filled: Condvar,
}

/// A thread-safe, write-once value holder. Clones share the same slot.
pub struct ResultCell<T> {
    inner: Arc<Inner<T>>,
}

impl<T> ResultCell<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    value: None,
                    wakers: Vec::new(),
                }),
                filled: Condvar::new(),
            }),
        }
    }

    // Every critical section leaves the slot consistent, so a poisoned lock
    // is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the value and wake every waiter.
    ///
    /// Fails with [`DoubleSetError`] if the cell is already filled; the
    /// stored value is left untouched.
    pub fn set(&self, value: T) -> Result<(), DoubleSetError> {
        let wakers = {
            let mut slot = self.lock();
            if slot.value.is_some() {
                return Err(DoubleSetError);
            }
            slot.value = Some(value);
            std::mem::take(&mut slot.wakers)
        };
        self.inner.filled.notify_all();
        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    pub fn is_filled(&self) -> bool {
        self.lock().value.is_some()
    }
}

impl<T: Clone> ResultCell<T> {
    /// Block the calling thread until the cell is filled, then return a copy
    /// of the value.
    pub fn get(&self) -> T {
        let mut slot = self.lock();
        loop {
            if let Some(value) = slot.value.as_ref() {
                return value.clone();
            }
            slot = self
                .inner
                .filled
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Non-blocking poll.
    pub fn try_get(&self) -> Option<T> {
        self.lock().value.clone()
    }

    /// Like [`get`](Self::get), but gives up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let slot = self.lock();
        let (slot, _) = self
            .inner
            .filled
            .wait_timeout_while(slot, timeout, |slot| slot.value.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.value.clone()
    }

    /// A future that resolves once the cell is filled. Does not block the
    /// executor thread.
    pub fn wait(&self) -> Wait<'_, T> {
        Wait { cell: self }
    }
}

impl<T> Default for ResultCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ResultCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ResultCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCell")
            .field("filled", &self.is_filled())
            .finish()
    }
}

/// Future returned by [`ResultCell::wait`].
#[must_use = "futures do nothing unless awaited"]
pub struct Wait<'a, T> {
    cell: &'a ResultCell<T>,
}

impl<T: Clone> Future for Wait<'_, T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut slot = self.cell.lock();
        if let Some(value) = slot.value.as_ref() {
            return Poll::Ready(value.clone());
        }
        if !slot.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            slot.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
