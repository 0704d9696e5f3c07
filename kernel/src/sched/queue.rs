//! Per-priority ready queues: an array of fixed-capacity circular buffers,
//! one per [`Priority`] level (spec §4.4). Grounded directly on the
//! teacher's `sched::queue::PriorityQueue`, with the element type narrowed
//! from a `NonNull<Task>` to a plain [`ThreadId`] — this kernel's threads
//! live in a fixed array table rather than behind individually-allocated
//! pointers, so the queue only ever needs to carry an id.

use crate::config::READY_QUEUE_DEPTH;
use crate::error::{KernelError, KernelResult};

use super::thread::{Priority, ThreadId};

struct PriorityQueue {
    entries: [Option<ThreadId>; READY_QUEUE_DEPTH],
    head: usize,
    tail: usize,
    count: usize,
}

impl PriorityQueue {
    const fn new() -> Self {
        Self {
            entries: [None; READY_QUEUE_DEPTH],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn enqueue(&mut self, id: ThreadId) -> KernelResult<()> {
        if self.count == READY_QUEUE_DEPTH {
            return Err(KernelError::QueueFull);
        }
        self.entries[self.tail] = Some(id);
        self.tail = (self.tail + 1) % READY_QUEUE_DEPTH;
        self.count += 1;
        Ok(())
    }

    fn dequeue(&mut self) -> Option<ThreadId> {
        if self.is_empty() {
            return None;
        }
        let id = self.entries[self.head].take();
        self.head = (self.head + 1) % READY_QUEUE_DEPTH;
        self.count -= 1;
        id
    }
}

/// Five priority-ordered FIFOs, scanned highest-to-lowest by
/// [`ReadyQueue::dequeue_highest`].
pub struct ReadyQueue {
    queues: [PriorityQueue; Priority::COUNT],
}

impl ReadyQueue {
    pub const fn new() -> Self {
        const EMPTY: PriorityQueue = PriorityQueue::new();
        Self {
            queues: [EMPTY; Priority::COUNT],
        }
    }

    pub fn enqueue(&mut self, priority: Priority, id: ThreadId) -> KernelResult<()> {
        self.queues[priority.index()].enqueue(id)
    }

    /// Dequeue the head of the highest (numerically lowest) non-empty
    /// priority queue. `None` means every queue is empty and the caller
    /// should fall back to the idle thread.
    pub fn dequeue_highest(&mut self) -> Option<ThreadId> {
        for queue in &mut self.queues {
            if let Some(id) = queue.dequeue() {
                return Some(id);
            }
        }
        None
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_priority() {
        let mut rq = ReadyQueue::new();
        rq.enqueue(Priority::Normal, ThreadId(1)).unwrap();
        rq.enqueue(Priority::Normal, ThreadId(2)).unwrap();
        assert_eq!(rq.dequeue_highest(), Some(ThreadId(1)));
        assert_eq!(rq.dequeue_highest(), Some(ThreadId(2)));
        assert_eq!(rq.dequeue_highest(), None);
    }

    #[test]
    fn higher_priority_preempts_order() {
        let mut rq = ReadyQueue::new();
        rq.enqueue(Priority::Low, ThreadId(1)).unwrap();
        rq.enqueue(Priority::RealTime, ThreadId(2)).unwrap();
        assert_eq!(rq.dequeue_highest(), Some(ThreadId(2)));
        assert_eq!(rq.dequeue_highest(), Some(ThreadId(1)));
    }

    #[test]
    fn queue_full_is_rejected() {
        let mut rq = ReadyQueue::new();
        for i in 0..READY_QUEUE_DEPTH {
            rq.enqueue(Priority::Normal, ThreadId(i as u64)).unwrap();
        }
        assert!(rq.enqueue(Priority::Normal, ThreadId(999)).is_err());
    }
}
