//! Deferred method invocations.
//!
//! A [`DeferredInvocation`] binds a shared target, a named operation (with
//! its arguments captured by the closure), a [`Priority`], and the
//! [`ResultCell`] its outcome will be delivered through. Only the scheduler's
//! worker executes it.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::ResultCell;

/// Handle returned to callers: filled with the operation's value or the
/// reason it produced none.
pub type Pending<T> = ResultCell<Result<T, InvocationError>>;

/// Scheduling priority. Higher runs first; the default is 0.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Priority(i32);

impl Priority {
    pub const DEFAULT: Priority = Priority(0);

    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i32 {
        self.0
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an invocation produced no value. Errors are delivered, not raised:
/// the worker keeps going either way.
#[derive(Debug, Clone, Error)]
pub enum InvocationError {
    /// The operation returned an error.
    #[error("{operation} failed: {error:#}")]
    Failed {
        operation: &'static str,
        error: Arc<anyhow::Error>,
    },
    /// The operation panicked.
    #[error("{operation} panicked: {message}")]
    Panicked {
        operation: &'static str,
        message: String,
    },
    /// The queue was full; the operation never ran.
    #[error("{operation} rejected: {pending} invocations already queued")]
    Rejected {
        operation: &'static str,
        pending: usize,
    },
}

impl InvocationError {
    /// Name of the operation that produced this error.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Failed { operation, .. }
            | Self::Panicked { operation, .. }
            | Self::Rejected { operation, .. } => operation,
        }
    }
}

/// A queued unit of work, type-erased so one scheduler can serve targets of
/// any type.
pub trait Invocation: Send {
    fn operation(&self) -> &'static str;
    fn priority(&self) -> Priority;

    /// Run the operation and fill the result cell. Called at most once, by
    /// the worker thread only. The returned outcome is a copy of what the
    /// cell received.
    fn execute(self: Box<Self>) -> Result<(), InvocationError>;

    /// Fill the result cell with a rejection without running the operation.
    fn reject(self: Box<Self>, pending: usize);
}

type Operation<S, T> = Box<dyn FnOnce(&mut S) -> anyhow::Result<T> + Send>;

/// An operation bound to its target, priority, and result cell.
pub struct DeferredInvocation<S, T> {
    target: Arc<Mutex<S>>,
    operation: &'static str,
    call: Operation<S, T>,
    priority: Priority,
    cell: Pending<T>,
}

impl<S, T> DeferredInvocation<S, T>
where
    S: Send + 'static,
    T: Send + 'static,
{
    pub fn new<F>(
        target: Arc<Mutex<S>>,
        operation: &'static str,
        priority: Priority,
        call: F,
    ) -> Self
    where
        F: FnOnce(&mut S) -> anyhow::Result<T> + Send + 'static,
    {
        Self {
            target,
            operation,
            call: Box::new(call),
            priority,
            cell: ResultCell::new(),
        }
    }

    /// The cell this invocation will fill.
    pub fn handle(&self) -> Pending<T> {
        self.cell.clone()
    }
}

fn deliver<T>(cell: &Pending<T>, operation: &'static str, outcome: Result<T, InvocationError>) {
    if let Err(err) = cell.set(outcome) {
        tracing::warn!(
            operation,
            %err,
            "result cell was filled before the invocation delivered"
        );
    }
}

impl<S, T> Invocation for DeferredInvocation<S, T>
where
    S: Send + 'static,
    T: Send + 'static,
{
    fn operation(&self) -> &'static str {
        self.operation
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn execute(self: Box<Self>) -> Result<(), InvocationError> {
        let Self {
            target,
            operation,
            call,
            cell,
            ..
        } = *self;

        // Only the worker locks the target, so this never contends. A panic
        // in a previous operation poisons it; the servant is still usable.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut servant = target.lock().unwrap_or_else(PoisonError::into_inner);
            call(&mut *servant)
        }));

        let outcome = match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(InvocationError::Failed {
                operation,
                error: Arc::new(error),
            }),
            Err(payload) => Err(InvocationError::Panicked {
                operation,
                message: panic_message(payload.as_ref()),
            }),
        };
        let report = outcome.as_ref().map(|_| ()).map_err(Clone::clone);
        deliver(&cell, operation, outcome);
        report
    }

    fn reject(self: Box<Self>, pending: usize) {
        let error = InvocationError::Rejected {
            operation: self.operation,
            pending,
        };
        deliver(&self.cell, self.operation, Err(error));
    }
}

impl<S, T> fmt::Debug for DeferredInvocation<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredInvocation")
            .field("operation", &self.operation)
            .field("priority", &self.priority)
            .field("cell", &self.cell)
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
