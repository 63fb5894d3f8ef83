//! Client façades: turn calls into deferred invocations.
//!
//! A façade owns the servant and never runs operations itself. Each call
//! builds a [`DeferredInvocation`], hands it to the [`Scheduler`], and
//! returns the [`Pending`] handle straight away. The caller decides when,
//! or whether, to block on it.

pub mod transaction;

use std::sync::{Arc, Mutex};

use crate::invocation::{DeferredInvocation, Pending, Priority};
use crate::scheduler::Scheduler;

/// Generic façade over any servant `S`.
pub struct ActiveProxy<S> {
    scheduler: Scheduler,
    target: Arc<Mutex<S>>,
}

impl<S: Send + 'static> ActiveProxy<S> {
    /// Bind `servant` to `scheduler`. From here on the servant is only
    /// touched by the scheduler's worker.
    pub fn new(scheduler: Scheduler, servant: S) -> Self {
        Self {
            scheduler,
            target: Arc::new(Mutex::new(servant)),
        }
    }

    /// Submit `op` at the default priority.
    pub fn call<T, F>(&self, operation: &'static str, op: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> anyhow::Result<T> + Send + 'static,
    {
        self.call_with_priority(operation, Priority::DEFAULT, op)
    }

    /// Submit `op` at `priority`. Higher runs first.
    pub fn call_with_priority<T, F>(
        &self,
        operation: &'static str,
        priority: impl Into<Priority>,
        op: F,
    ) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> anyhow::Result<T> + Send + 'static,
    {
        let invocation =
            DeferredInvocation::new(Arc::clone(&self.target), operation, priority.into(), op);
        let handle = invocation.handle();
        self.scheduler.submit(Box::new(invocation));
        handle
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl<S> Clone for ActiveProxy<S> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            target: Arc::clone(&self.target),
        }
    }
}

impl<S> std::fmt::Debug for ActiveProxy<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveProxy")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
