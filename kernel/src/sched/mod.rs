//! Priority-based preemptive scheduler: thread table, per-priority ready
//! queues, and the deferred-reschedule policy (spec §4.4).
//!
//! Grounded on the teacher's `sched::task`/`sched::queue` shapes (`Priority`
//! enum, circular-array `PriorityQueue`), trimmed to the five priorities and
//! plain FIFO-within-priority discipline the spec calls for — no CFS
//! `vruntime`, no priority boosting, no CPU affinity (single CPU, per
//! Non-goals).

pub mod queue;
pub mod thread;

pub use queue::ReadyQueue;
pub use thread::{Priority, Thread, ThreadId, ThreadState};

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::Mutex;

use crate::config::MAX_THREADS;
use crate::error::{KernelError, KernelResult};
use crate::process::ProcessId;
use crate::sync::GlobalState;

/// Fixed-capacity thread table, indexed by [`ThreadId`] modulo capacity.
pub struct ThreadTable {
    threads: [Option<Thread>; MAX_THREADS],
}

impl ThreadTable {
    const fn new() -> Self {
        Self {
            threads: [const { None }; MAX_THREADS],
        }
    }

    fn slot(&self, id: ThreadId) -> usize {
        (id.0 as usize) % MAX_THREADS
    }

    fn insert(&mut self, thread: Thread) -> KernelResult<()> {
        let slot = self.slot(thread.id);
        if self.threads[slot].is_some() {
            return Err(KernelError::TableFull { table: "thread" });
        }
        self.threads[slot] = Some(thread);
        Ok(())
    }

    fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.threads[self.slot(id)].as_ref().filter(|t| t.id == id)
    }

    fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        let slot = self.slot(id);
        self.threads[slot].as_mut().filter(|t| t.id == id)
    }

    fn remove(&mut self, id: ThreadId) -> Option<Thread> {
        let slot = self.slot(id);
        if self.threads[slot].as_ref().map(|t| t.id) == Some(id) {
            self.threads[slot].take()
        } else {
            None
        }
    }
}

static THREAD_TABLE: GlobalState<Mutex<ThreadTable>> = GlobalState::new();
static READY_QUEUES: GlobalState<Mutex<ReadyQueue>> = GlobalState::new();
static RESCHEDULE: AtomicBool = AtomicBool::new(false);
static CURRENT: AtomicU64 = AtomicU64::new(0);
static NEXT_TID: AtomicU64 = AtomicU64::new(1);

/// Thread id 0 is the idle thread: never blocks, never exits, always
/// schedulable as the fallback when every ready queue is empty.
pub const IDLE_THREAD: ThreadId = ThreadId(0);

/// Initialize the thread table and ready queues, and install the idle
/// thread at [`IDLE_THREAD`].
pub fn init() {
    let _ = THREAD_TABLE.init(Mutex::new(ThreadTable::new()));
    let _ = READY_QUEUES.init(Mutex::new(ReadyQueue::new()));
    let idle = Thread::new_idle(IDLE_THREAD);
    THREAD_TABLE
        .with_mut(|t| t.lock().insert(idle))
        .expect("thread table not initialized")
        .expect("idle thread slot already occupied");
    CURRENT.store(IDLE_THREAD.0, Ordering::Relaxed);
}

fn alloc_tid() -> ThreadId {
    ThreadId(NEXT_TID.fetch_add(1, Ordering::Relaxed))
}

/// Create a new thread owned by `owner`, in `Ready` state, enqueued on its
/// priority's ready queue.
pub fn spawn_thread(
    owner: Option<ProcessId>,
    priority: Priority,
    entry: u64,
    user_sp: u64,
    kernel_stack: crate::mm::PhysAddr,
    is_user: bool,
) -> KernelResult<ThreadId> {
    let id = alloc_tid();
    let thread = Thread::new(id, owner, priority, entry, user_sp, kernel_stack, is_user);
    THREAD_TABLE
        .with_mut(|t| t.lock().insert(thread))
        .ok_or(KernelError::NotInitialized { subsystem: "sched" })??;
    READY_QUEUES
        .with_mut(|q| q.lock().enqueue(priority, id))
        .ok_or(KernelError::NotInitialized { subsystem: "sched" })??;
    Ok(id)
}

/// The currently running thread's id.
pub fn current() -> ThreadId {
    ThreadId(CURRENT.load(Ordering::Relaxed))
}

/// Run `f` with a shared reference to thread `id`, if it exists.
pub fn with_thread<R>(id: ThreadId, f: impl FnOnce(&Thread) -> R) -> Option<R> {
    THREAD_TABLE.with(|t| t.lock().get(id).map(f))?
}

/// Run `f` with an exclusive reference to thread `id`, if it exists.
pub fn with_thread_mut<R>(id: ThreadId, f: impl FnOnce(&mut Thread) -> R) -> Option<R> {
    THREAD_TABLE.with_mut(|t| t.lock().get_mut(id).map(f))?
}

/// Set the process-wide reschedule flag (spec §3's "Reschedule flag"),
/// consulted only at the exception-return boundary.
pub fn request_reschedule() {
    RESCHEDULE.store(true, Ordering::Relaxed);
}

/// Clear and return the reschedule flag.
pub fn take_reschedule() -> bool {
    RESCHEDULE.swap(false, Ordering::Relaxed)
}

/// Timer tick: decrement the running thread's time slice; on exhaustion,
/// reset it and request a reschedule. Never switches here (spec §4.4's
/// deferred-reschedule policy) — the actual dequeue/switch happens at
/// exception return via [`schedule`].
pub fn on_timer_tick() {
    let cur = current();
    if cur == IDLE_THREAD {
        request_reschedule();
        return;
    }
    let exhausted = with_thread_mut(cur, |t| {
        if t.time_slice > 0 {
            t.time_slice -= 1;
        }
        t.time_slice == 0
    });
    if exhausted == Some(true) {
        with_thread_mut(cur, |t| t.time_slice = t.priority.time_slice_ticks());
        request_reschedule();
    }
}

/// Voluntary yield: re-enqueue `current` at the tail of its priority queue
/// and request a reschedule (spec §4.4's "Yield").
pub fn yield_now() {
    let cur = current();
    if cur == IDLE_THREAD {
        request_reschedule();
        return;
    }
    if let Some(priority) = with_thread(cur, |t| t.priority) {
        with_thread_mut(cur, |t| t.state = ThreadState::Ready);
        let _ = READY_QUEUES.with_mut(|q| q.lock().enqueue(priority, cur));
    }
    request_reschedule();
}

/// Block the current thread in `state` (one of the `blocked_*` states).
/// The thread is left off every ready queue; it is referenced only by
/// whatever structure blocked it (spec §4.4's "Block").
pub fn block_current(state: ThreadState) {
    let cur = current();
    with_thread_mut(cur, |t| t.state = state);
    request_reschedule();
}

/// Move a blocked thread back to the tail of its priority's ready queue
/// (spec §4.4's "Unblock").
pub fn unblock(id: ThreadId) -> KernelResult<()> {
    let priority = with_thread_mut(id, |t| {
        t.state = ThreadState::Ready;
        t.priority
    })
    .ok_or(KernelError::ThreadNotFound { tid: id.0 })?;
    READY_QUEUES
        .with_mut(|q| q.lock().enqueue(priority, id))
        .ok_or(KernelError::NotInitialized { subsystem: "sched" })?
}

/// Scan priorities from highest to lowest, dequeue the head of the first
/// non-empty queue, and make it `current`. Falls back to the idle thread
/// if every queue is empty. Re-enqueues the previously running thread if it
/// is still `Running` (i.e. was preempted rather than blocked or exited).
///
/// Returns `(previous, next)` thread ids so the caller (the exception
/// return path) can perform the actual register/TTBR context switch.
pub fn schedule() -> (ThreadId, ThreadId) {
    let prev = current();
    if prev != IDLE_THREAD {
        if let Some(still_running) = with_thread(prev, |t| t.state == ThreadState::Running) {
            if still_running {
                if let Some(priority) = with_thread(prev, |t| t.priority) {
                    with_thread_mut(prev, |t| t.state = ThreadState::Ready);
                    let _ = READY_QUEUES.with_mut(|q| q.lock().enqueue(priority, prev));
                }
            }
        }
    }

    let next = READY_QUEUES
        .with_mut(|q| q.lock().dequeue_highest())
        .flatten()
        .unwrap_or(IDLE_THREAD);

    with_thread_mut(next, |t| t.state = ThreadState::Running);
    CURRENT.store(next.0, Ordering::Relaxed);
    (prev, next)
}

/// Remove a dead thread from the thread table entirely. Called during
/// process cleanup (`process::reap`) once every thread of a zombie process
/// has run its course.
pub fn retire_thread(id: ThreadId) -> Option<Thread> {
    THREAD_TABLE.with_mut(|t| t.lock().remove(id))?
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    fn reset() {
        let _ = THREAD_TABLE.init(Mutex::new(ThreadTable::new()));
        let _ = READY_QUEUES.init(Mutex::new(ReadyQueue::new()));
    }

    #[test]
    fn thread_table_rejects_duplicate_insert() {
        reset();
        let t1 = Thread::new(ThreadId(5), None, Priority::Normal, 0, 0, crate::mm::PhysAddr::NULL, true);
        let t2 = Thread::new(ThreadId(5), None, Priority::Normal, 0, 0, crate::mm::PhysAddr::NULL, true);
        THREAD_TABLE.with_mut(|tab| {
            let mut tab = tab.lock();
            assert!(tab.insert(t1).is_ok());
            assert!(tab.insert(t2).is_err());
        });
    }
}
