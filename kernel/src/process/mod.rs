//! Process control blocks, the process table, and process lifecycle
//! (spawn/exit/wait/cleanup, spec §4.4). Grounded on the teacher's
//! `process::pcb::{Process, ProcessId, ProcessState}` shape and
//! `process::table`'s fixed-array no-alloc pattern, trimmed to the fields
//! this kernel's single-threaded-per-process model actually needs (no
//! `CapabilitySpace`, no heap-allocated name, no `Sleeping` state — this
//! kernel has no timed sleep).

pub mod memory;
pub mod table;

pub use memory::MemoryRegion;
pub use table::ProcessTable;

use crate::config::MAX_MEMORY_REGIONS;
use crate::error::{KernelError, KernelResult};
use crate::mm::AddressSpace;
use crate::sched::{Priority, ThreadId};
use crate::sync::GlobalState;
use spin::Mutex;

/// Opaque process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ProcessId(pub u64);

/// Process lifecycle state (spec §3/§4.4's process state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Zombie,
    Dead,
}

/// A process control block: address space, thread membership, exit status,
/// and the memory-region ledger used to deterministically free every frame
/// this process owns at cleanup (spec §3's "Process" entry).
pub struct Process {
    pub pid: ProcessId,
    pub parent: Option<ProcessId>,
    pub state: ProcessState,
    pub address_space: AddressSpace,
    pub thread_count: usize,
    pub main_thread: ThreadId,
    pub exit_code: i32,
    pub memory_regions: [Option<MemoryRegion>; MAX_MEMORY_REGIONS],
    /// Next free virtual address `MAP_DEVICE` will hand out, advancing by
    /// one page-aligned region per call within this process's device range
    /// (spec §4.6's "fixed user device-base virtual range").
    pub device_next: u64,
    /// Next free virtual address `ALLOC_DMA` will hand out, advancing the
    /// same way within this process's DMA range.
    pub dma_next: u64,
}

impl Process {
    fn new(pid: ProcessId, parent: Option<ProcessId>, address_space: AddressSpace) -> Self {
        Self {
            pid,
            parent,
            state: ProcessState::Running,
            address_space,
            thread_count: 1,
            main_thread: ThreadId(0),
            exit_code: 0,
            memory_regions: [None; MAX_MEMORY_REGIONS],
            device_next: crate::config::USER_DEVICE_BASE,
            dma_next: crate::config::USER_DMA_BASE,
        }
    }

    /// Record a physically-contiguous region this process owns, for
    /// deterministic release at cleanup.
    pub fn track_region(&mut self, phys_base: crate::mm::PhysAddr, page_count: usize) -> KernelResult<()> {
        for slot in &mut self.memory_regions {
            if slot.is_none() {
                *slot = Some(MemoryRegion { phys_base, page_count, in_use: true });
                return Ok(());
            }
        }
        Err(KernelError::TableFull { table: "process.memory_regions" })
    }
}

static PROCESS_TABLE: GlobalState<Mutex<ProcessTable>> = GlobalState::new();
static NEXT_PID: core::sync::atomic::AtomicU64 = core::sync::atomic::AtomicU64::new(1);

pub fn init() {
    let _ = PROCESS_TABLE.init(Mutex::new(ProcessTable::new()));
}

fn alloc_pid() -> ProcessId {
    ProcessId(NEXT_PID.fetch_add(1, core::sync::atomic::Ordering::Relaxed))
}

/// Create a new user process: a fresh address space with the kernel/device
/// region mirrored in, the program's code copied into freshly allocated
/// frames and mapped at the fixed user code base, a user stack, a kernel
/// stack, and a `Ready` main thread (spec §4.4's "Create user process").
///
/// Any failure partway through unwinds everything already allocated before
/// returning, so no partially-constructed process is ever made reachable.
pub fn create_user_process(
    parent: Option<ProcessId>,
    code: &[u8],
    entry_offset: u32,
) -> KernelResult<ProcessId> {
    let pid = alloc_pid();
    let address_space = AddressSpace::new()?;
    let mut process = Process::new(pid, parent, address_space);

    match crate::loader::load_into(&mut process, code, entry_offset) {
        Ok(thread_id) => {
            process.main_thread = thread_id;
            PROCESS_TABLE
                .with_mut(|t| t.lock().insert(process))
                .ok_or(KernelError::NotInitialized { subsystem: "process" })??;
            Ok(pid)
        }
        Err(e) => {
            unwind_partial_process(process);
            Err(e)
        }
    }
}

fn unwind_partial_process(mut process: Process) {
    for region in process.memory_regions.iter_mut().flatten() {
        if region.in_use {
            let _ = crate::mm::frame_allocator::free_pages(region.phys_base, region.page_count);
            region.in_use = false;
        }
    }
    process.address_space.destroy();
}

/// Mark every thread of the current process dead, move the process to
/// `Zombie`, store `code`, unblock a parent waiting on this child (or on
/// any child), and request a reschedule (spec §4.4's "Exit").
pub fn exit_current(code: i32) {
    let cur = crate::sched::current();
    let pid = crate::sched::with_thread(cur, |t| t.owner).flatten();
    let Some(pid) = pid else {
        return;
    };

    let parent = PROCESS_TABLE.with_mut(|t| {
        let mut t = t.lock();
        let parent = t.get(pid).and_then(|p| p.parent);
        if let Some(p) = t.get_mut(pid) {
            p.state = ProcessState::Zombie;
            p.exit_code = code;
        }
        parent
    });

    crate::sched::with_thread_mut(cur, |t| t.state = crate::sched::ThreadState::Dead);

    if let Some(parent_pid) = parent.flatten() {
        wake_waiting_parent(parent_pid, pid);
    }
    crate::sched::request_reschedule();
}

/// If `parent_pid`'s main thread is blocked in `WAIT` on `child_pid` (or on
/// "any child"), reap `child_pid` right now and stage its `(pid, exit_code)`
/// into the parent's saved frame before waking it — unlike IPC's direct
/// handoff, `exit` doesn't know in advance which blocked parent (if any) is
/// watching, so the match against `Thread::wait_target` happens here.
fn wake_waiting_parent(parent_pid: ProcessId, child_pid: ProcessId) {
    let waiter = PROCESS_TABLE.with(|t| t.lock().get(parent_pid).map(|p| p.main_thread));
    let Some(Some(tid)) = waiter else {
        return;
    };
    let is_match = crate::sched::with_thread(tid, |t| {
        t.state == crate::sched::ThreadState::BlockedWait
            && (t.wait_target.is_none() || t.wait_target == Some(child_pid))
    })
    .unwrap_or(false);
    if !is_match {
        return;
    }
    if let Ok(Some((reaped_pid, code))) = wait_for_child(parent_pid, Some(child_pid)) {
        crate::sched::with_thread_mut(tid, |t| {
            t.wait_target = None;
            t.pending_return = Some([reaped_pid.0, code as i64 as u64, 0]);
        });
        let _ = crate::sched::unblock(tid);
    }
}

/// Scan for a zombie child of `parent` matching `target` (or any zombie
/// child if `target` is `None`). If found, reap it and return
/// `(pid, exit_code)`. If the process has no children at all, returns
/// `Err(NoChildren)`. Otherwise the caller should block with
/// `blocked_wait` (spec §4.4's "Wait").
pub fn wait_for_child(parent: ProcessId, target: Option<ProcessId>) -> KernelResult<Option<(ProcessId, i32)>> {
    let found = PROCESS_TABLE.with(|t| {
        let t = t.lock();
        let mut any_children = false;
        let mut zombie = None;
        t.for_each(|p| {
            if p.parent == Some(parent) {
                any_children = true;
                if p.state == ProcessState::Zombie && (target.is_none() || target == Some(p.pid)) {
                    zombie = Some(p.pid);
                }
            }
        });
        (any_children, zombie)
    });

    let Some((any_children, zombie_pid)) = found else {
        return Err(KernelError::NotInitialized { subsystem: "process" });
    };

    if !any_children {
        return Err(KernelError::NoChildren);
    }

    match zombie_pid {
        Some(pid) => {
            let code = reap(pid)?;
            Ok(Some((pid, code)))
        }
        None => Ok(None),
    }
}

/// Free every tracked memory region, destroy the address space, retire the
/// main thread, and clear the process slot (spec §4.4's "Cleanup").
fn reap(pid: ProcessId) -> KernelResult<i32> {
    let mut process = PROCESS_TABLE
        .with_mut(|t| t.lock().remove(pid))
        .ok_or(KernelError::NotInitialized { subsystem: "process" })?
        .ok_or(KernelError::ProcessNotFound { pid: pid.0 })?;

    for region in process.memory_regions.iter_mut().flatten() {
        if region.in_use {
            crate::mm::frame_allocator::free_pages(region.phys_base, region.page_count)?;
            region.in_use = false;
        }
    }
    crate::sched::retire_thread(process.main_thread);
    let code = process.exit_code;
    process.address_space.destroy();
    Ok(code)
}

/// Look up a process's parent id, used by `GETPPID`.
pub fn parent_of(pid: ProcessId) -> Option<ProcessId> {
    PROCESS_TABLE.with(|t| t.lock().get(pid).and_then(|p| p.parent))?
}

/// Translate a [`ThreadId`] to its owning process, for `GETPID`.
pub fn owner_of(tid: ThreadId) -> Option<ProcessId> {
    crate::sched::with_thread(tid, |t| t.owner)?
}

/// Run `f` with exclusive access to process `pid`'s memory-region ledger
/// and address space, used by the memory syscalls (`MAP_DEVICE`,
/// `ALLOC_DMA`, `GET_PHYS`).
pub fn with_process_mut<R>(pid: ProcessId, f: impl FnOnce(&mut Process) -> R) -> Option<R> {
    PROCESS_TABLE.with_mut(|t| t.lock().get_mut(pid).map(f))?
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn process_id_defaults_to_zero() {
        assert_eq!(ProcessId::default(), ProcessId(0));
    }
}
