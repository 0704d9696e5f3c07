//! Debug syscalls: `DEBUG_PRINT`, `GET_TICKS` (spec §4.6). `DEBUG_PRINT`
//! reuses the same user-range validation as the console syscalls since it's
//! the same "copy bytes out of the caller's address space" operation, just
//! routed to the structured logger instead of raw UART output.

use super::{value, SyscallError, SyscallResult};
use crate::mm::VirtAddr;
use crate::process;

const MAX_DEBUG_LEN: u64 = 4096;

/// `DEBUG_PRINT(addr, len)`: log `len` bytes from the caller's `addr` as a
/// single `log::debug!` record.
pub fn sys_debug_print(addr: u64, len: u64) -> SyscallResult {
    if len == 0 || len > MAX_DEBUG_LEN {
        return Err(SyscallError::InvalidArgument);
    }
    let pid = {
        let cur = crate::sched::current();
        process::owner_of(cur).ok_or(SyscallError::InvalidArgument)?
    };
    let last = addr.checked_add(len - 1).ok_or(SyscallError::InvalidArgument)?;
    process::with_process_mut(pid, |p| {
        p.address_space.translate(VirtAddr::new(addr))?;
        p.address_space.translate(VirtAddr::new(last))?;
        Ok::<(), crate::error::KernelError>(())
    })
    .ok_or(SyscallError::InvalidArgument)??;

    // SAFETY: both endpoints of this range were just confirmed to resolve
    // in the caller's own, currently-active address space.
    let bytes = unsafe { core::slice::from_raw_parts(addr as *const u8, len as usize) };
    match core::str::from_utf8(bytes) {
        Ok(s) => log::debug!("[user {}] {}", pid.0, s),
        Err(_) => log::debug!("[user {}] <{} bytes, non-utf8>", pid.0, len),
    }
    value(len)
}

/// `GET_TICKS()`: ticks elapsed since boot at [`crate::config::TICK_HZ`]
/// resolution.
pub fn sys_get_ticks() -> SyscallResult {
    value(crate::arch::aarch64::timer::ticks())
}
