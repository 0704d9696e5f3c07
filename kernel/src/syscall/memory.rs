//! Memory syscalls: `MAP_DEVICE`, `ALLOC_DMA`, `GET_PHYS` (spec §4.6). The
//! only capability enforcement this kernel performs at all — the device
//! allowlist — lives in `MAP_DEVICE`'s path (spec's Non-goals: "no
//! security/capability enforcement beyond a device-region allowlist").

use super::{triple, value, SyscallError, SyscallResult};
use crate::config::{MAX_DMA_PAGES, PAGE_SIZE};
use crate::mm::{AddressSpace, MapFlags, PhysAddr, VirtAddr};
use crate::process::{self, ProcessId};

fn current_pid() -> Result<ProcessId, SyscallError> {
    let cur = crate::sched::current();
    process::owner_of(cur).ok_or(SyscallError::InvalidArgument)
}

/// `MAP_DEVICE(phys_base, len)`: reject anything not fully contained in the
/// static allowlist, map it device-attributed and user-accessible at the
/// process's device-base cursor, and return the virtual address (spec's
/// "Device-region allowlist").
pub fn sys_map_device(phys_base: u64, len: u64) -> SyscallResult {
    if len == 0 || len > u32::MAX as u64 {
        return Err(SyscallError::InvalidArgument);
    }
    if !crate::devices::is_allowed(phys_base, len) {
        return Err(SyscallError::NoPermission);
    }
    let pid = current_pid()?;
    let page_count = crate::devices::page_count(len);
    let page_base = phys_base & !(PAGE_SIZE as u64 - 1);

    let virt_base = process::with_process_mut(pid, |p| -> Result<u64, SyscallError> {
        let virt_base = p.device_next;
        for i in 0..page_count {
            let virt = VirtAddr::new(virt_base + (i * PAGE_SIZE) as u64);
            let phys = PhysAddr::new(page_base + (i * PAGE_SIZE) as u64);
            p.address_space.map(virt, phys, MapFlags::DEVICE_RW | MapFlags::USER)?;
        }
        p.device_next += (page_count * PAGE_SIZE) as u64;
        Ok(virt_base)
    })
    .ok_or(SyscallError::NotFound)??;

    value(virt_base + (phys_base - page_base))
}

/// `ALLOC_DMA(page_count)`: physically-contiguous frames mapped as
/// non-cacheable inner-shareable user memory, tracked in the caller's
/// memory-region ledger for deferred cleanup, returning `(virtual,
/// physical)` in `(x0, x1)` (spec's "DMA allocation").
pub fn sys_alloc_dma(page_count: u64) -> SyscallResult {
    let page_count = page_count as usize;
    if page_count == 0 || page_count > MAX_DMA_PAGES {
        return Err(SyscallError::InvalidArgument);
    }
    let pid = current_pid()?;
    let phys_base = crate::mm::frame_allocator::alloc_contiguous(page_count)?;

    let result = process::with_process_mut(pid, |p| -> Result<u64, SyscallError> {
        let virt_base = p.dma_next;
        for i in 0..page_count {
            let virt = VirtAddr::new(virt_base + (i * PAGE_SIZE) as u64);
            let phys = phys_base.offset((i * PAGE_SIZE) as u64);
            p.address_space.map(virt, phys, MapFlags::USER_DMA)?;
        }
        p.dma_next += (page_count * PAGE_SIZE) as u64;
        p.track_region(phys_base, page_count)?;
        Ok(virt_base)
    })
    .ok_or(SyscallError::NotFound);

    match result {
        Ok(Ok(virt_base)) => triple(virt_base, phys_base.as_u64(), 0),
        Ok(Err(e)) => {
            let _ = crate::mm::frame_allocator::free_pages(phys_base, page_count);
            Err(e)
        }
        Err(e) => {
            let _ = crate::mm::frame_allocator::free_pages(phys_base, page_count);
            Err(e)
        }
    }
}

/// `GET_PHYS(virt)`: translate a user virtual address in the caller's own
/// address space to its backing physical address.
pub fn sys_get_phys(virt: u64) -> SyscallResult {
    let pid = current_pid()?;
    let phys = process::with_process_mut(pid, |p: &mut crate::process::Process| {
        let space: &AddressSpace = &p.address_space;
        space.translate(VirtAddr::new(virt))
    })
    .ok_or(SyscallError::NotFound)??;
    value(phys.as_u64())
}
