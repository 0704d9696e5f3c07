//! Thread control block and its scheduling-relevant fields (spec §3's
//! "Thread" entry). Grounded on the teacher's `sched::task::Task`/
//! `Priority`, stripped of the CFS/SMP/alloc machinery (`vruntime`,
//! `CpuSet`, `SchedClass`, heap-allocated `name`) this kernel has no use
//! for.

use crate::config::TIME_SLICES;
use crate::mm::PhysAddr;
use crate::process::ProcessId;

/// Opaque thread identifier. Id 0 is reserved for the idle thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ThreadId(pub u64);

/// Scheduling priority, highest to lowest (spec §3/§4.4). Discriminant order
/// matches [`crate::config::TIME_SLICES`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    RealTime = 0,
    High = 1,
    Normal = 2,
    Low = 3,
    Idle = 4,
}

impl Priority {
    pub const COUNT: usize = 5;

    pub const fn index(self) -> usize {
        self as u8 as usize
    }

    pub const fn time_slice_ticks(self) -> u32 {
        TIME_SLICES[self.index()]
    }
}

/// Thread lifecycle state (spec §3/§4.4's state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    BlockedIpc,
    BlockedWait,
    Dead,
}

/// A single schedulable thread (spec §3's "Thread" fixed-capacity table
/// entry). Every context switch is a full exception-frame save/restore at
/// the exception-return boundary (`arch::aarch64::exceptions`), so the only
/// scheduling-relevant register state carried here is the saved frame
/// pointer ([`Thread::kernel_sp`]) and, for a thread that has never yet run,
/// its entry PC.
pub struct Thread {
    pub id: ThreadId,
    pub owner: Option<ProcessId>,
    pub state: ThreadState,
    pub priority: Priority,
    pub time_slice: u32,
    pub is_user: bool,
    /// User-mode stack pointer, meaningful only while `is_user` and either
    /// running or most recently running at EL0.
    pub user_sp: u64,
    /// Kernel-mode stack pointer used while this thread executes exception
    /// handlers.
    pub kernel_sp: u64,
    /// Physical base of this thread's kernel stack, recorded so it can be
    /// freed when the thread is retired.
    pub kernel_stack_phys: PhysAddr,
    /// Entry PC for a thread that has never yet run.
    pub entry: u64,
    pub first_run: bool,
    /// Staged `(x0, x1, x2)` syscall return values for a blocked thread.
    /// The IPC layer leaves a blocked thread's saved frame untouched (spec
    /// §4.6's "blocked syscall return sentinel") and stages the eventual
    /// return value here instead; the exception-return path patches the
    /// saved frame with this value and clears it the moment this thread is
    /// next dispatched, so the write lands before the thread ever resumes.
    pub pending_return: Option<[u64; 3]>,
    /// While `state == BlockedWait`, the child this thread's `WAIT` named
    /// (`None` means "any child"). Consulted by `process::wake_waiting_parent`
    /// to decide whether a specific child's exit is the one this thread is
    /// blocked on, since unlike IPC's direct handoff a waking `exit` doesn't
    /// know in advance which blocked parent (if any) is watching for it.
    pub wait_target: Option<ProcessId>,
}

impl Thread {
    pub fn new(
        id: ThreadId,
        owner: Option<ProcessId>,
        priority: Priority,
        entry: u64,
        user_sp: u64,
        kernel_stack_phys: PhysAddr,
        is_user: bool,
    ) -> Self {
        Self {
            id,
            owner,
            state: ThreadState::Ready,
            priority,
            time_slice: priority.time_slice_ticks(),
            is_user,
            user_sp,
            kernel_sp: 0,
            kernel_stack_phys,
            entry,
            first_run: true,
            pending_return: None,
            wait_target: None,
        }
    }

    pub(super) fn new_idle(id: ThreadId) -> Self {
        Self {
            id,
            owner: None,
            state: ThreadState::Running,
            priority: Priority::Idle,
            time_slice: Priority::Idle.time_slice_ticks(),
            is_user: false,
            user_sp: 0,
            kernel_sp: 0,
            kernel_stack_phys: PhysAddr::NULL,
            entry: 0,
            first_run: false,
            pending_return: None,
            wait_target: None,
        }
    }
}
