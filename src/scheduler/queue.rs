//! The activation queue: pending invocations ordered by priority, then by
//! arrival.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

use crate::invocation::{Invocation, Priority};

pub(crate) struct QueuedInvocation {
    pub(crate) priority: Priority,
    pub(crate) sequence: u64,
    pub(crate) invocation: Box<dyn Invocation>,
}

impl fmt::Debug for QueuedInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedInvocation")
            .field("operation", &self.invocation.operation())
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl PartialEq for QueuedInvocation {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedInvocation {}

impl PartialOrd for QueuedInvocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Max-heap: higher priority is greater; among equals the earlier sequence is
// greater so it pops first.
impl Ord for QueuedInvocation {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ActivationQueue {
    heap: BinaryHeap<QueuedInvocation>,
    next_sequence: u64,
}

impl ActivationQueue {
    /// Enqueue and return the assigned sequence number.
    pub(crate) fn push(&mut self, invocation: Box<dyn Invocation>) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedInvocation {
            priority: invocation.priority(),
            sequence,
            invocation,
        });
        sequence
    }

    pub(crate) fn pop(&mut self) -> Option<QueuedInvocation> {
        self.heap.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::InvocationError;

    struct Noop(Priority);

    impl Invocation for Noop {
        fn operation(&self) -> &'static str {
            "noop"
        }

        fn priority(&self) -> Priority {
            self.0
        }

        fn execute(self: Box<Self>) -> Result<(), InvocationError> {
            Ok(())
        }

        fn reject(self: Box<Self>, _pending: usize) {}
    }

    fn drain(queue: &mut ActivationQueue) -> Vec<(i32, u64)> {
        std::iter::from_fn(|| queue.pop())
            .map(|q| (q.priority.value(), q.sequence))
            .collect()
    }

    #[test]
    fn pops_highest_priority_first() {
        let mut queue = ActivationQueue::default();
        for p in [1, 10, 5] {
            queue.push(Box::new(Noop(Priority::new(p))));
        }
        assert_eq!(drain(&mut queue), vec![(10, 1), (5, 2), (1, 0)]);
    }

    #[test]
    fn equal_priorities_pop_in_arrival_order() {
        let mut queue = ActivationQueue::default();
        for _ in 0..4 {
            queue.push(Box::new(Noop(Priority::new(5))));
        }
        assert_eq!(drain(&mut queue), vec![(5, 0), (5, 1), (5, 2), (5, 3)]);
    }

    #[test]
    fn negative_priorities_sort_below_default() {
        let mut queue = ActivationQueue::default();
        queue.push(Box::new(Noop(Priority::new(-3))));
        queue.push(Box::new(Noop(Priority::DEFAULT)));
        assert_eq!(drain(&mut queue), vec![(0, 1), (-3, 0)]);
    }

    #[test]
    fn sequence_keeps_increasing_after_pops() {
        let mut queue = ActivationQueue::default();
        assert_eq!(queue.push(Box::new(Noop(Priority::DEFAULT))), 0);
        queue.pop();
        assert!(queue.is_empty());
        assert_eq!(queue.push(Box::new(Noop(Priority::DEFAULT))), 1);
        assert_eq!(queue.len(), 1);
    }
}
