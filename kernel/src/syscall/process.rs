//! Process/thread lifecycle syscalls: `EXIT`, `YIELD`, `GETPID`, `GETTID`,
//! `SPAWN`, `WAIT`, `GETPPID` (spec §4.4, §4.6). Grounded on the teacher's
//! `syscall::process` handler split, narrowed to this kernel's single
//! parent-linked spawn/exit/wait model (no fork/exec — this kernel only
//! ever creates a process from an MLK image, spec §6).

use super::{triple, value, SyscallError, SyscallResult, SyscallOutcome};
use crate::process::ProcessId;
use crate::sched::ThreadState;

pub fn sys_exit(code: i32) -> SyscallResult {
    crate::process::exit_current(code);
    Ok(SyscallOutcome::Blocking)
}

pub fn sys_yield() -> SyscallResult {
    crate::sched::yield_now();
    value(0)
}

pub fn sys_getpid() -> SyscallResult {
    let cur = crate::sched::current();
    let pid = crate::process::owner_of(cur).ok_or(SyscallError::InvalidArgument)?;
    value(pid.0)
}

pub fn sys_gettid() -> SyscallResult {
    value(crate::sched::current().0)
}

pub fn sys_getppid() -> SyscallResult {
    let cur = crate::sched::current();
    let pid = crate::process::owner_of(cur).ok_or(SyscallError::InvalidArgument)?;
    let parent = crate::process::parent_of(pid).ok_or(SyscallError::NotFound)?;
    value(parent.0)
}

/// `SPAWN(binary_id)`: resolve `binary_id` in the build-time binary
/// registry, create a fresh user process from its MLK image with the
/// caller as parent, and enqueue its main thread (spec §6's "Binary
/// registry").
pub fn sys_spawn(binary_id: u64) -> SyscallResult {
    let cur = crate::sched::current();
    let parent = crate::process::owner_of(cur).ok_or(SyscallError::InvalidArgument)?;
    let binary = crate::loader::lookup_binary(binary_id)?;
    let pid = crate::process::create_user_process(Some(parent), binary.code, binary.entry_offset)?;
    value(pid.0)
}

/// `WAIT(target)`: `target < 0` means "any child" (spec's worked examples'
/// `target=-1`). Returns `(pid, exit_code)` immediately if a matching
/// zombie already exists; otherwise blocks and lets a later `exit`'s
/// `process::wake_waiting_parent` stage the return value (spec §4.4's
/// "Wait").
pub fn sys_wait(target_raw: i64) -> SyscallResult {
    let cur = crate::sched::current();
    let pid = crate::process::owner_of(cur).ok_or(SyscallError::InvalidArgument)?;
    let target = if target_raw < 0 { None } else { Some(ProcessId(target_raw as u64)) };

    match crate::process::wait_for_child(pid, target) {
        Ok(Some((child_pid, code))) => triple(child_pid.0, code as i64 as u64, 0),
        Ok(None) => {
            crate::sched::with_thread_mut(cur, |t| t.wait_target = target);
            crate::sched::block_current(ThreadState::BlockedWait);
            Ok(SyscallOutcome::Blocking)
        }
        Err(e) => Err(e.into()),
    }
}
