//! The task manager's priority queue.
//!
//! Entries are ordered by `(priority desc, creation time asc, counter asc)`
//! so that a higher priority always wins, and ties within a priority class
//! resolve FIFO even when two tasks share a millisecond.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use labgrid_types::TaskId;

#[derive(Debug, Eq, PartialEq)]
pub struct QueueEntry {
    pub priority: u32,
    pub created_ms: i64,
    pub counter: u64,
    pub task_id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_ms.cmp(&self.created_ms))
            .then_with(|| other.counter.cmp(&self.counter))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<QueueEntry>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueueEntry) {
        self.heap.push(entry);
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_dequeues_first() {
        let mut q = PriorityQueue::new();
        q.push(QueueEntry { priority: 0, created_ms: 100, counter: 1, task_id: "a".into() });
        q.push(QueueEntry { priority: 5, created_ms: 200, counter: 2, task_id: "b".into() });
        q.push(QueueEntry { priority: 0, created_ms: 300, counter: 3, task_id: "c".into() });

        assert_eq!(q.pop().unwrap().task_id, "b");
        assert_eq!(q.pop().unwrap().task_id, "a");
        assert_eq!(q.pop().unwrap().task_id, "c");
    }

    #[test]
    fn same_priority_is_fifo_by_creation_time() {
        let mut q = PriorityQueue::new();
        q.push(QueueEntry { priority: 1, created_ms: 50, counter: 1, task_id: "first".into() });
        q.push(QueueEntry { priority: 1, created_ms: 10, counter: 2, task_id: "second".into() });

        // "second" was created earlier (created_ms=10) so it dequeues first.
        assert_eq!(q.pop().unwrap().task_id, "second");
        assert_eq!(q.pop().unwrap().task_id, "first");
    }

    #[test]
    fn tie_on_timestamp_breaks_by_counter() {
        let mut q = PriorityQueue::new();
        q.push(QueueEntry { priority: 1, created_ms: 10, counter: 5, task_id: "later".into() });
        q.push(QueueEntry { priority: 1, created_ms: 10, counter: 1, task_id: "earlier".into() });

        assert_eq!(q.pop().unwrap().task_id, "earlier");
        assert_eq!(q.pop().unwrap().task_id, "later");
    }
}
