//! Console syscalls: `WRITE`, `READ` (spec §4.6). The kernel never switches
//! address space between trapping a syscall and servicing it, so a user
//! pointer is valid to dereference directly from EL1 as long as it
//! actually resolves in the caller's own mappings — checked up front via
//! `AddressSpace::translate` so a bad pointer surfaces as `InvalidArgument`
//! (spec §7's "bad pointer range ... surfaced synchronously") instead of
//! crashing the kernel with an EL1 data abort.

use super::{value, SyscallError, SyscallResult};
use crate::mm::VirtAddr;
use crate::process;

/// Upper bound on a single `WRITE`/`READ`, generous for the worked
/// examples' short strings without letting a runaway length wedge the
/// kernel in a byte-at-a-time UART loop.
const MAX_TRANSFER: u64 = 4096;

fn validate_user_range(addr: u64, len: u64) -> Result<(), SyscallError> {
    if len == 0 || len > MAX_TRANSFER {
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
    Ok(())
}

/// `WRITE(addr, len)`: copy `len` bytes starting at the caller's `addr` to
/// the UART.
pub fn sys_write(addr: u64, len: u64) -> SyscallResult {
    validate_user_range(addr, len)?;
    // SAFETY: `validate_user_range` confirmed both endpoints of this range
    // resolve in the caller's own address space, which is exactly the
    // address space active right now.
    let bytes = unsafe { core::slice::from_raw_parts(addr as *const u8, len as usize) };
    for &b in bytes {
        let _ = crate::arch::aarch64::uart::write_byte(b);
    }
    value(len)
}

/// `READ(addr, max_len)`: non-blocking console read. Copies whatever bytes
/// are immediately available (possibly zero) into the caller's buffer and
/// returns the count read.
pub fn sys_read(addr: u64, max_len: u64) -> SyscallResult {
    validate_user_range(addr, max_len)?;
    // SAFETY: see `sys_write`.
    let bytes = unsafe { core::slice::from_raw_parts_mut(addr as *mut u8, max_len as usize) };
    let mut count = 0usize;
    while (count as u64) < max_len {
        match crate::arch::aarch64::uart::try_read_byte() {
            Some(b) => {
                bytes[count] = b;
                count += 1;
            }
            None => break,
        }
    }
    value(count as u64)
}
