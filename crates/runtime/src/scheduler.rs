//! Game-time scheduler for suspended executions.
//!
//! Time is a monotonically increasing `f64` of game seconds, advanced
//! explicitly by the session. Suspended executions sit in a min-heap keyed
//! by resume time; ties resume in suspension order, which keeps replays
//! deterministic across peers.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nodeforge_core::{Execution, NodeId};

/// One parked execution.
#[derive(Debug)]
pub struct Scheduled {
    pub resume_at: f64,
    /// Node whose removal cancels this execution instead of resuming it.
    pub watch: Option<NodeId>,
    pub execution: Execution,
    seq: u64,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the earliest entry wins, with
        // the suspension sequence breaking ties.
        other
            .resume_at
            .total_cmp(&self.resume_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of suspended executions plus the session clock.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Scheduled>,
    next_seq: u64,
    now: f64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current game time in seconds.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Number of executions currently parked.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Parks an execution to resume `delay` seconds from now.
    pub fn park(&mut self, delay: f64, watch: Option<NodeId>, execution: Execution) {
        let entry = Scheduled {
            resume_at: self.now + delay.max(0.0),
            watch,
            execution,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.queue.push(entry);
    }

    /// Advances the clock and pops the next execution due at or before the
    /// new time. Callers loop until `None`, so executions that re-suspend
    /// within the window are picked up in the same advance.
    pub fn advance(&mut self, dt: f64) {
        self.now += dt.max(0.0);
    }

    /// Pops the earliest execution due at or before the current time.
    pub fn next_due(&mut self) -> Option<Scheduled> {
        if self
            .queue
            .peek()
            .is_some_and(|entry| entry.resume_at <= self.now)
        {
            self.queue.pop()
        } else {
            None
        }
    }

    /// Drops every parked execution acting for or watching the given node.
    /// Used when a node is removed out from under its pending scripts.
    pub fn cancel_watching(&mut self, node: NodeId) -> usize {
        let before = self.queue.len();
        let kept: Vec<Scheduled> = self
            .queue
            .drain()
            .filter(|entry| {
                entry.watch != Some(node) && entry.execution.acting_node != Some(node)
            })
            .collect();
        self.queue = kept.into();
        before - self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeforge_core::Context;

    fn dummy_execution() -> Execution {
        Execution::new(Vec::new().into(), Context::new(), None)
    }

    fn acting_execution(node: NodeId) -> Execution {
        Execution::new(Vec::new().into(), Context::new(), Some(node))
    }

    #[test]
    fn entries_come_due_in_time_then_insertion_order() {
        let mut scheduler = Scheduler::new();
        scheduler.park(5.0, None, dummy_execution());
        scheduler.park(2.0, None, dummy_execution());
        scheduler.park(2.0, None, dummy_execution());

        assert!(scheduler.next_due().is_none());

        scheduler.advance(2.0);
        let first = scheduler.next_due().unwrap();
        let second = scheduler.next_due().unwrap();
        assert!(first.seq > 0 && second.seq > first.seq);
        assert!(scheduler.next_due().is_none());

        scheduler.advance(3.0);
        assert!(scheduler.next_due().is_some());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancellation_removes_only_watchers_of_the_node() {
        let mut scheduler = Scheduler::new();
        scheduler.park(1.0, Some(NodeId(7)), dummy_execution());
        scheduler.park(1.0, Some(NodeId(8)), dummy_execution());
        scheduler.park(1.0, None, dummy_execution());

        assert_eq!(scheduler.cancel_watching(NodeId(7)), 1);
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn cancellation_also_covers_the_acting_node() {
        let mut scheduler = Scheduler::new();
        // Watching another node does not shield an execution from its own
        // acting node's removal.
        scheduler.park(1.0, Some(NodeId(8)), acting_execution(NodeId(7)));
        scheduler.park(1.0, None, acting_execution(NodeId(7)));
        scheduler.park(1.0, None, acting_execution(NodeId(9)));

        assert_eq!(scheduler.cancel_watching(NodeId(7)), 2);
        assert_eq!(scheduler.pending(), 1);
    }
}
