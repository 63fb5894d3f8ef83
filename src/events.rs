//! Scheduler lifecycle events.
//!
//! The worker emits events via [`EventBus::emit`]; observers subscribe via
//! [`EventBus::subscribe`]. Built on [`tokio::sync::broadcast`], so emitting
//! never blocks the worker and needs no runtime. Subscribers that fall
//! behind lose the oldest events.

use tokio::sync::broadcast;

use crate::consts::DEFAULT_EVENT_CAPACITY;
use crate::invocation::Priority;

/// Something that happened to an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Accepted into the queue.
    Submitted {
        operation: &'static str,
        priority: Priority,
        sequence: u64,
    },
    /// Taken off the queue by the worker.
    Started {
        operation: &'static str,
        priority: Priority,
        sequence: u64,
    },
    /// Finished and delivered a value.
    Completed {
        operation: &'static str,
        sequence: u64,
    },
    /// Finished and delivered an error.
    Failed {
        operation: &'static str,
        sequence: u64,
        error: String,
    },
    /// Refused because the queue was full.
    Rejected {
        operation: &'static str,
        priority: Priority,
    },
}

/// A broadcast channel of scheduler events.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    /// Returns the number of receivers that will see it.
    pub fn emit(&self, event: SchedulerEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events. Returns a receiver that yields all
    /// future events (does not replay past ones).
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(sequence: u64) -> SchedulerEvent {
        SchedulerEvent::Completed {
            operation: "process_transaction",
            sequence,
        }
    }

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(completed(3));

        let event = rx.recv().await.unwrap();
        assert_eq!(event, completed(3));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(SchedulerEvent::Rejected {
            operation: "ledger",
            priority: Priority::new(2),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1, e2);
        assert!(matches!(
            e1,
            SchedulerEvent::Rejected {
                operation: "ledger",
                ..
            }
        ));
    }

    #[test]
    fn emit_without_subscribers_returns_zero() {
        let bus = EventBus::default();
        assert_eq!(bus.emit(completed(0)), 0);
    }

    #[test]
    fn emit_with_subscriber_returns_count() {
        let bus = EventBus::default();
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();

        assert_eq!(bus.emit(completed(1)), 2);
    }

    #[test]
    fn lagging_subscriber_loses_oldest_events() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for sequence in 0..4 {
            bus.emit(completed(sequence));
        }

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(2))
        ));
        assert_eq!(rx.try_recv().unwrap(), completed(2));
    }
}
