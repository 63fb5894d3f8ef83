//! The dispatch queue and its single worker thread.
//!
//! Callers [`submit`](Scheduler::submit) invocations from any thread without
//! blocking; one dedicated worker takes the highest-priority invocation and
//! runs it to completion before taking the next. Because only the worker
//! executes, every target reached through the scheduler is accessed
//! serially.

pub(crate) mod queue;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::events::{EventBus, SchedulerEvent};
use crate::invocation::{Invocation, InvocationError, panic_message};
use queue::{ActivationQueue, QueuedInvocation};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid scheduler config: {0:#}")]
    InvalidConfig(anyhow::Error),
    #[error("failed to spawn worker thread `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Running totals since the scheduler started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Accepted into the queue.
    pub submitted: u64,
    /// Executed to completion, successfully or not.
    pub executed: u64,
    /// Executed and delivered an error.
    pub failed: u64,
    /// Refused because the queue was full.
    pub rejected: u64,
}

struct State {
    queue: ActivationQueue,
    paused: bool,
    closed: bool,
    stats: SchedulerStats,
}

struct Shared {
    state: Mutex<State>,
    available: Condvar,
    events: EventBus,
    max_pending: Option<usize>,
    worker_name: String,
}

impl Shared {
    // The queue and counters are consistent at every unlock, so poisoning
    // carries no information here.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block the worker until an invocation may run. Returns `None` once
    /// every scheduler handle is gone and the queue is drained.
    fn take_highest(&self) -> Option<QueuedInvocation> {
        let mut state = self.lock();
        loop {
            // Nobody can resume a closed scheduler, so it drains even if paused.
            if !state.paused || state.closed {
                if let Some(next) = state.queue.pop() {
                    self.events.emit(SchedulerEvent::Started {
                        operation: next.invocation.operation(),
                        priority: next.priority,
                        sequence: next.sequence,
                    });
                    return Some(next);
                }
                if state.closed {
                    return None;
                }
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn run_worker(&self) {
        info!(worker = %self.worker_name, "worker started");
        while let Some(next) = self.take_highest() {
            let QueuedInvocation {
                priority,
                sequence,
                invocation,
            } = next;
            let operation = invocation.operation();
            debug!(operation, %priority, sequence, "executing invocation");

            // A hand-written `Invocation` may panic outside its own guard; the
            // worker must outlive it.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| invocation.execute()))
                .unwrap_or_else(|payload| {
                    Err(InvocationError::Panicked {
                        operation,
                        message: panic_message(payload.as_ref()),
                    })
                });

            let mut state = self.lock();
            state.stats.executed += 1;
            match outcome {
                Ok(()) => {
                    self.events.emit(SchedulerEvent::Completed {
                        operation,
                        sequence,
                    });
                }
                Err(error) => {
                    state.stats.failed += 1;
                    warn!(operation, sequence, %error, "invocation failed");
                    self.events.emit(SchedulerEvent::Failed {
                        operation,
                        sequence,
                        error: error.to_string(),
                    });
                }
            }
            if state.queue.is_empty() {
                debug!(worker = %self.worker_name, "queue empty, worker idle");
            }
        }
        info!(worker = %self.worker_name, "worker exiting, queue drained");
    }
}

// Dropped with the last `Scheduler` clone; tells the worker to drain and stop.
struct Owner {
    shared: Arc<Shared>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.available.notify_all();
    }
}

/// Handle to a dispatch queue and its worker. Cheap to clone; all clones
/// feed the same worker.
///
/// There is no shutdown call. The worker runs detached, so it never keeps
/// the process alive; once every handle is dropped it finishes what is
/// already queued and exits.
#[derive(Clone)]
pub struct Scheduler {
    owner: Arc<Owner>,
}

impl Scheduler {
    /// Start a scheduler with the default config.
    pub fn new() -> Result<Self, SchedulerError> {
        Self::with_config(SchedulerConfig::default())
    }

    /// Start a scheduler. The worker thread is running when this returns.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: ActivationQueue::default(),
                paused: config.start_paused,
                closed: false,
                stats: SchedulerStats::default(),
            }),
            available: Condvar::new(),
            events: EventBus::new(config.event_capacity),
            max_pending: config.max_pending,
            worker_name: config.worker_name.clone(),
        });

        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name(config.worker_name.clone())
            .spawn(move || worker.run_worker())
            .map_err(|source| SchedulerError::Spawn {
                name: config.worker_name,
                source,
            })?;

        Ok(Self {
            owner: Arc::new(Owner { shared }),
        })
    }

    fn shared(&self) -> &Shared {
        &self.owner.shared
    }

    /// Queue an invocation. Never blocks beyond the heap insertion.
    ///
    /// If the queue is at `max_pending`, the invocation is rejected: its
    /// result cell is filled with [`InvocationError::Rejected`] and it never
    /// runs.
    pub fn submit(&self, invocation: Box<dyn Invocation>) {
        let shared = self.shared();
        let operation = invocation.operation();
        let priority = invocation.priority();

        let mut state = shared.lock();
        if let Some(limit) = shared.max_pending
            && state.queue.len() >= limit
        {
            state.stats.rejected += 1;
            shared.events.emit(SchedulerEvent::Rejected {
                operation,
                priority,
            });
            drop(state);
            warn!(operation, %priority, limit, "queue full, invocation rejected");
            invocation.reject(limit);
            return;
        }

        let sequence = state.queue.push(invocation);
        state.stats.submitted += 1;
        shared.events.emit(SchedulerEvent::Submitted {
            operation,
            priority,
            sequence,
        });
        drop(state);

        shared.available.notify_one();
        debug!(operation, %priority, sequence, "invocation queued");
    }

    /// Stop taking new work after the current invocation. Submissions still
    /// queue.
    pub fn pause(&self) {
        self.shared().lock().paused = true;
        debug!(worker = %self.shared().worker_name, "worker paused");
    }

    pub fn resume(&self) {
        self.shared().lock().paused = false;
        self.shared().available.notify_all();
        debug!(worker = %self.shared().worker_name, "worker resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared().lock().paused
    }

    /// Invocations queued but not yet started.
    pub fn pending(&self) -> usize {
        self.shared().lock().queue.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared().lock().stats
    }

    pub fn worker_name(&self) -> &str {
        &self.shared().worker_name
    }

    /// Receive future [`SchedulerEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.shared().events.subscribe()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared().lock();
        f.debug_struct("Scheduler")
            .field("worker", &self.shared().worker_name)
            .field("pending", &state.queue.len())
            .field("paused", &state.paused)
            .field("stats", &state.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::invocation::{DeferredInvocation, Priority};

    fn paused() -> Scheduler {
        Scheduler::with_config(SchedulerConfig {
            start_paused: true,
            ..SchedulerConfig::default()
        })
        .unwrap()
    }

    fn push(target: &Arc<Mutex<Vec<i32>>>, priority: i32) -> DeferredInvocation<Vec<i32>, ()> {
        DeferredInvocation::new(
            Arc::clone(target),
            "push",
            Priority::new(priority),
            move |v| {
                v.push(priority);
                Ok(())
            },
        )
    }

    #[test]
    fn invalid_config_is_refused() {
        let err = Scheduler::with_config(SchedulerConfig {
            event_capacity: 0,
            ..SchedulerConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidConfig(_)));
    }

    #[test]
    fn worker_thread_carries_configured_name() {
        let scheduler = Scheduler::with_config(SchedulerConfig {
            worker_name: "ledger-worker".to_string(),
            ..SchedulerConfig::default()
        })
        .unwrap();
        let target = Arc::new(Mutex::new(()));
        let invocation = DeferredInvocation::new(target, "name", Priority::DEFAULT, |_| {
            Ok(thread::current().name().map(str::to_string))
        });
        let handle = invocation.handle();
        scheduler.submit(Box::new(invocation));

        assert_eq!(handle.get().unwrap().as_deref(), Some("ledger-worker"));
        assert_eq!(scheduler.worker_name(), "ledger-worker");
    }

    #[test]
    fn paused_scheduler_holds_work_until_resumed() {
        let scheduler = paused();
        let target = Arc::new(Mutex::new(Vec::new()));
        let invocation = push(&target, 1);
        let handle = invocation.handle();
        scheduler.submit(Box::new(invocation));

        assert!(scheduler.is_paused());
        assert!(handle.get_timeout(Duration::from_millis(50)).is_none());
        assert_eq!(scheduler.pending(), 1);

        scheduler.resume();
        assert!(handle.get().is_ok());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn full_queue_rejects_without_running() {
        let scheduler = Scheduler::with_config(SchedulerConfig {
            start_paused: true,
            max_pending: Some(1),
            ..SchedulerConfig::default()
        })
        .unwrap();
        let target = Arc::new(Mutex::new(Vec::new()));
        let first = push(&target, 1);
        let second = push(&target, 2);
        let (h1, h2) = (first.handle(), second.handle());

        scheduler.submit(Box::new(first));
        scheduler.submit(Box::new(second));

        assert!(matches!(
            h2.try_get(),
            Some(Err(InvocationError::Rejected { pending: 1, .. }))
        ));
        scheduler.resume();
        assert!(h1.get().is_ok());
        assert_eq!(*target.lock().unwrap(), vec![1]);
        assert_eq!(scheduler.stats().rejected, 1);
        assert_eq!(scheduler.stats().submitted, 1);
    }

    #[test]
    fn dropping_last_handle_drains_queue() {
        let scheduler = paused();
        let target = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = [3, 1, 2]
            .into_iter()
            .map(|p| {
                let invocation = push(&target, p);
                let handle = invocation.handle();
                scheduler.submit(Box::new(invocation));
                handle
            })
            .collect();

        drop(scheduler);

        for handle in handles {
            assert!(handle.get().is_ok());
        }
        assert_eq!(*target.lock().unwrap(), vec![3, 2, 1]);
    }

    struct Unguarded;

    impl Invocation for Unguarded {
        fn operation(&self) -> &'static str {
            "unguarded"
        }

        fn priority(&self) -> Priority {
            Priority::new(1)
        }

        fn execute(self: Box<Self>) -> Result<(), InvocationError> {
            panic!("escaped the invocation")
        }

        fn reject(self: Box<Self>, _pending: usize) {}
    }

    #[test]
    fn worker_survives_invocation_that_panics_in_execute() {
        let scheduler = paused();
        let target = Arc::new(Mutex::new(Vec::new()));
        scheduler.submit(Box::new(Unguarded));
        let after = push(&target, 0);
        let handle = after.handle();
        scheduler.submit(Box::new(after));

        scheduler.resume();

        assert!(handle.get_timeout(Duration::from_secs(5)).is_some());
        assert_eq!(*target.lock().unwrap(), vec![0]);
        let stats = scheduler.stats();
        assert_eq!(stats.failed, 1);
        assert!(stats.executed >= 1);
    }

    #[test]
    fn debug_reports_queue_state() {
        let scheduler = paused();
        let rendered = format!("{scheduler:?}");
        assert!(rendered.contains("pending: 0"));
        assert!(rendered.contains("paused: true"));
    }
}
