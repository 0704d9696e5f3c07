//! Per-process address spaces: ASID allocation and the 4-level page-table
//! walk that backs `map`/`unmap`/`destroy` (spec §4.2).
//!
//! The kernel's own identity-mapped region (low RAM plus the UART/GIC device
//! ranges) lives under a single shared subtree rooted at level-0 index
//! [`KERNEL_L0_INDEX`] of every address space's root table. That subtree is
//! built once by [`init_kernel_space`] and its physical address is copied
//! into each new [`AddressSpace`]'s root verbatim — never walked, never
//! freed by [`AddressSpace::destroy`]. Level-0 index [`USER_L0_INDEX`] is
//! where a process's own code, stack, device, and DMA mappings live, and is
//! the only part of the tree `destroy` recurses into. This split is what
//! lets the "kernel mirrored into every TTBR0" requirement and the
//! "destroy recursively frees every table this process allocated"
//! requirement coexist without the kernel subtree being double-freed.
//!
//! Grounded on the teacher's fixed-capacity table pattern
//! (`process::table::ProcessArray`) for the ASID bitmap, and on the
//! teacher's page-table shape (`mm::page_table`) for the walk itself.

use spin::Mutex;

use crate::config::PAGE_SIZE;
use crate::error::{KernelError, KernelResult};
use crate::sync::GlobalState;

use super::frame_allocator;
use super::page_table::{AccessPerm, LeafAttrs, MemoryType, PageTable, Shareability};
use super::{PhysAddr, VirtAddr};

/// Level-0 index reserved for the shared kernel/device identity map,
/// mirrored read-only (from the process's point of view) into every
/// address space.
pub const KERNEL_L0_INDEX: usize = 0;

/// Level-0 index under which a process's own mappings (code, stack,
/// devices, DMA) live.
pub const USER_L0_INDEX: usize = 1;

bitflags::bitflags! {
    /// Mapping permission/kind taxonomy passed to [`AddressSpace::map`].
    /// Named combinations mirror the regions spec §4.2 and the device/DMA
    /// syscalls actually need; the bits themselves are orthogonal so callers
    /// may combine them, but the named constants are the intended API.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MapFlags: u32 {
        const READ    = 1 << 0;
        const WRITE   = 1 << 1;
        const EXEC    = 1 << 2;
        const USER    = 1 << 3;
        const DEVICE  = 1 << 4;
        const NOCACHE = 1 << 5;

        const KERNEL_RWX = Self::READ.bits() | Self::WRITE.bits() | Self::EXEC.bits();
        const KERNEL_RW  = Self::READ.bits() | Self::WRITE.bits();
        const KERNEL_RO  = Self::READ.bits();
        const KERNEL_RX  = Self::READ.bits() | Self::EXEC.bits();
        const DEVICE_RW  = Self::READ.bits() | Self::WRITE.bits() | Self::DEVICE.bits();
        const USER_RWX   = Self::READ.bits() | Self::WRITE.bits() | Self::EXEC.bits() | Self::USER.bits();
        const USER_RW    = Self::READ.bits() | Self::WRITE.bits() | Self::USER.bits();
        const USER_RO    = Self::READ.bits() | Self::USER.bits();
        const USER_RX    = Self::READ.bits() | Self::EXEC.bits() | Self::USER.bits();
        const USER_DMA   = Self::READ.bits() | Self::WRITE.bits() | Self::USER.bits()
            | Self::DEVICE.bits() | Self::NOCACHE.bits();
    }
}

impl MapFlags {
    fn leaf_attrs(self) -> LeafAttrs {
        let user = self.contains(MapFlags::USER);
        let write = self.contains(MapFlags::WRITE);
        let access = match (user, write) {
            (true, true) => AccessPerm::UserRw,
            (true, false) => AccessPerm::UserRo,
            (false, true) => AccessPerm::KernelRw,
            (false, false) => AccessPerm::KernelRo,
        };
        let mem_type = if self.contains(MapFlags::DEVICE) {
            if self.contains(MapFlags::NOCACHE) {
                MemoryType::NormalNonCacheable
            } else {
                MemoryType::Device
            }
        } else {
            MemoryType::Normal
        };
        let shareability = if self.contains(MapFlags::DEVICE) {
            Shareability::OuterShareable
        } else {
            Shareability::InnerShareable
        };
        LeafAttrs {
            access,
            shareability,
            mem_type,
            exec_never_el0: user && !self.contains(MapFlags::EXEC),
            exec_never_el1: !user || !self.contains(MapFlags::EXEC),
            global: !user,
        }
    }
}

/// Physical-to-virtual translation for table walking. The kernel's own
/// identity-mapped region covers all of managed RAM 1:1, so a table's
/// physical address is also its virtual address while running with the
/// MMU on.
///
/// # Safety
/// `phys` must be the address of a frame obtained from the frame allocator
/// and currently in use as a page table.
unsafe fn table_at(phys: PhysAddr) -> &'static mut PageTable {
    // SAFETY: caller guarantees `phys` names a live page-table frame, and
    // the kernel identity map makes its physical address directly
    // dereferenceable.
    unsafe { &mut *(phys.as_usize() as *mut PageTable) }
}

fn alloc_table() -> KernelResult<PhysAddr> {
    let phys = frame_allocator::alloc_frame()?;
    // SAFETY: `phys` was just allocated and is not yet visible to any other
    // table walk.
    unsafe { table_at(phys) }.zero();
    Ok(phys)
}

const MAX_ASIDS: usize = 256;

struct AsidAllocator {
    words: [u64; MAX_ASIDS / 64],
}

impl AsidAllocator {
    const fn new() -> Self {
        // ASID 0 is reserved for the kernel-only bootstrap context.
        let mut words = [u64::MAX; MAX_ASIDS / 64];
        words[0] &= !1;
        Self { words }
    }

    fn alloc(&mut self) -> KernelResult<u16> {
        for (i, word) in self.words.iter_mut().enumerate() {
            if *word != 0 {
                let bit = word.trailing_zeros() as usize;
                *word &= !(1 << bit);
                return Ok((i * 64 + bit) as u16);
            }
        }
        Err(KernelError::TableFull { table: "asid" })
    }

    fn free(&mut self, asid: u16) {
        let asid = asid as usize;
        self.words[asid / 64] |= 1 << (asid % 64);
    }
}

static ASIDS: GlobalState<Mutex<AsidAllocator>> = GlobalState::new();
static KERNEL_SUBTREE: GlobalState<PhysAddr> = GlobalState::new();
static BOOT_ROOT: GlobalState<PhysAddr> = GlobalState::new();

/// Build the shared kernel/device identity-map subtree, plus a top-level
/// root table (ASID 0) that mirrors it at [`KERNEL_L0_INDEX`] and nothing
/// else — used as the initial TTBR0_EL1 value from the moment the MMU is
/// enabled until the first [`AddressSpace`] is switched to. Must run
/// once, after [`frame_allocator::init`], before any `AddressSpace` is
/// created.
pub fn init_kernel_space() {
    let subtree = alloc_table().expect("out of memory building kernel address space");
    let _ = KERNEL_SUBTREE.init(subtree);

    let boot_root = alloc_table().expect("out of memory building boot root table");
    {
        // SAFETY: `boot_root` was just allocated and is not yet reachable
        // from any other thread.
        let table = unsafe { table_at(boot_root) };
        table[KERNEL_L0_INDEX].set_table(subtree);
    }
    let _ = BOOT_ROOT.init(boot_root);
}

/// The bootstrap root table's physical address (this kernel's only
/// non-process TTBR0 value), used once to program TTBR0_EL1 when the MMU
/// is first enabled.
pub fn boot_root() -> PhysAddr {
    BOOT_ROOT
        .with(|r| *r)
        .expect("boot_root called before init_kernel_space")
}

/// Identity-map `[phys, phys + len)` into the shared kernel subtree with
/// `flags`. Used once at boot to map the kernel image and the platform's
/// device registers; never called again afterward.
pub fn map_kernel_identity(phys: PhysAddr, len: u64, flags: MapFlags) -> KernelResult<()> {
    let root = KERNEL_SUBTREE
        .with(|r| *r)
        .ok_or(KernelError::NotInitialized { subsystem: "mm::address_space" })?;
    let mut addr = phys.as_u64() & !(PAGE_SIZE as u64 - 1);
    let end = phys.as_u64() + len;
    while addr < end {
        walk_and_map(root, VirtAddr::new(addr), PhysAddr::new(addr), flags)?;
        addr += PAGE_SIZE as u64;
    }
    Ok(())
}

/// A process's private address space: its own root table (level-0 index
/// [`USER_L0_INDEX`] onward) plus an ASID, and the ledger of intermediate
/// table frames it owns so `destroy` can free exactly those.
pub struct AddressSpace {
    root: PhysAddr,
    asid: u16,
    table_pages: [Option<PhysAddr>; crate::config::MAX_TABLE_PAGES],
    table_page_count: usize,
}

impl AddressSpace {
    /// Create a new address space: a fresh root table with the shared
    /// kernel subtree mirrored at [`KERNEL_L0_INDEX`], and a freshly
    /// allocated ASID.
    pub fn new() -> KernelResult<Self> {
        let kernel_subtree = KERNEL_SUBTREE
            .with(|r| *r)
            .ok_or(KernelError::NotInitialized { subsystem: "mm::address_space" })?;
        let root = alloc_table()?;
        {
            // SAFETY: `root` was just allocated by `alloc_table` and is not
            // yet reachable from any other thread.
            let table = unsafe { table_at(root) };
            table[KERNEL_L0_INDEX].set_table(kernel_subtree);
        }
        let asid = ASIDS
            .with_mut(|a| a.lock().alloc())
            .ok_or(KernelError::NotInitialized { subsystem: "mm::address_space" })??;
        Ok(Self {
            root,
            asid,
            table_pages: [None; crate::config::MAX_TABLE_PAGES],
            table_page_count: 0,
        })
    }

    pub fn root(&self) -> PhysAddr {
        self.root
    }

    pub fn asid(&self) -> u16 {
        self.asid
    }

    fn record_table_page(&mut self, phys: PhysAddr) -> KernelResult<()> {
        if self.table_page_count >= self.table_pages.len() {
            return Err(KernelError::TableFull { table: "address_space.table_pages" });
        }
        self.table_pages[self.table_page_count] = Some(phys);
        self.table_page_count += 1;
        Ok(())
    }

    /// Map `virt` to `phys` with `flags`, allocating intermediate tables on
    /// demand (spec §4.2's `map`). Only [`USER_L0_INDEX`] is reachable
    /// through this path; callers never address the shared kernel subtree
    /// through a process's own `AddressSpace`.
    pub fn map(&mut self, virt: VirtAddr, phys: PhysAddr, flags: MapFlags) -> KernelResult<()> {
        if virt.table_index(0) != USER_L0_INDEX {
            return Err(KernelError::InvalidArgument { name: "virt (must be user range)" });
        }
        self.walk_and_map_owned(virt, phys, flags)
    }

    fn walk_and_map_owned(
        &mut self,
        virt: VirtAddr,
        phys: PhysAddr,
        flags: MapFlags,
    ) -> KernelResult<()> {
        // SAFETY: `self.root` is this address space's own table, allocated
        // by `AddressSpace::new` and live for the lifetime of `self`.
        let mut table = unsafe { table_at(self.root) };
        for level in 0..3 {
            let idx = virt.table_index(level);
            let entry = &mut table[idx];
            let next = if entry.is_valid() {
                entry.output_addr()
            } else {
                let new_table = alloc_table()?;
                self.record_table_page(new_table)?;
                entry.set_table(new_table);
                new_table
            };
            // SAFETY: `next` is either a table this address space already
            // owns (recorded on a prior call) or one just allocated above.
            table = unsafe { table_at(next) };
        }
        let leaf_idx = virt.table_index(3);
        table[leaf_idx].set_page(phys, flags.leaf_attrs());
        Ok(())
    }

    /// Walk this address space's own mappings and return the physical
    /// address `virt` currently resolves to, preserving the page offset
    /// (spec's `GET_PHYS` syscall).
    pub fn translate(&self, virt: VirtAddr) -> KernelResult<PhysAddr> {
        if virt.table_index(0) != USER_L0_INDEX {
            return Err(KernelError::InvalidArgument { name: "virt (must be user range)" });
        }
        // SAFETY: see `walk_and_map_owned`.
        let mut table = unsafe { table_at(self.root) };
        for level in 0..3 {
            let idx = virt.table_index(level);
            let entry = &table[idx];
            if !entry.is_valid() {
                return Err(KernelError::UnmappedMemory { addr: virt.as_usize() });
            }
            let next = entry.output_addr();
            // SAFETY: a valid intermediate entry always names a table this
            // address space owns.
            table = unsafe { table_at(next) };
        }
        let leaf_idx = virt.table_index(3);
        let leaf = &table[leaf_idx];
        if !leaf.is_valid() {
            return Err(KernelError::UnmappedMemory { addr: virt.as_usize() });
        }
        Ok(leaf.output_addr().offset(virt.page_offset() as u64))
    }

    /// Clear the leaf mapping for `virt`, per spec §4.2's `unmap`:
    /// intermediate tables are left in place and only reclaimed at
    /// `destroy`.
    pub fn unmap(&mut self, virt: VirtAddr) -> KernelResult<()> {
        if virt.table_index(0) != USER_L0_INDEX {
            return Err(KernelError::InvalidArgument { name: "virt (must be user range)" });
        }
        // SAFETY: see `walk_and_map_owned`.
        let mut table = unsafe { table_at(self.root) };
        for level in 0..3 {
            let idx = virt.table_index(level);
            let entry = &table[idx];
            if !entry.is_valid() {
                return Err(KernelError::UnmappedMemory { addr: virt.as_usize() });
            }
            let next = entry.output_addr();
            // SAFETY: a valid intermediate entry always names a table this
            // address space owns.
            table = unsafe { table_at(next) };
        }
        let leaf_idx = virt.table_index(3);
        if !table[leaf_idx].is_valid() {
            return Err(KernelError::UnmappedMemory { addr: virt.as_usize() });
        }
        table[leaf_idx].clear();
        crate::arch::aarch64::mmu::invalidate_tlb_va(self.asid, virt);
        Ok(())
    }

    /// Recursively free every intermediate table and the root this address
    /// space owns, skipping the shared kernel subtree entirely. Frees the
    /// ASID last so it cannot be reissued while any stale TLB entry for it
    /// might remain.
    pub fn destroy(mut self) {
        for slot in self.table_pages.into_iter().flatten() {
            let _ = frame_allocator::free_frame(slot);
        }
        self.table_page_count = 0;
        let _ = frame_allocator::free_frame(self.root);
        ASIDS.with_mut(|a| a.lock().free(self.asid));
        crate::arch::aarch64::mmu::invalidate_tlb_asid(self.asid);
    }
}

fn walk_and_map(
    root: PhysAddr,
    virt: VirtAddr,
    phys: PhysAddr,
    flags: MapFlags,
) -> KernelResult<()> {
    // SAFETY: `root` is the shared kernel subtree, allocated once by
    // `init_kernel_space` and live for the lifetime of the kernel.
    let mut table = unsafe { table_at(root) };
    for level in 0..3 {
        let idx = virt.table_index(level);
        let entry = &mut table[idx];
        let next = if entry.is_valid() {
            entry.output_addr()
        } else {
            let new_table = alloc_table()?;
            entry.set_table(new_table);
            new_table
        };
        // SAFETY: `next` is a table owned by the shared kernel subtree.
        table = unsafe { table_at(next) };
    }
    let leaf_idx = virt.table_index(3);
    table[leaf_idx].set_page(phys, flags.leaf_attrs());
    Ok(())
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn asid_alloc_excludes_zero_and_is_reusable() {
        let mut a = AsidAllocator::new();
        let first = a.alloc().unwrap();
        assert_ne!(first, 0);
        a.free(first);
        let second = a.alloc().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn asid_pool_exhausts() {
        let mut a = AsidAllocator::new();
        for _ in 0..MAX_ASIDS - 1 {
            a.alloc().unwrap();
        }
        assert!(a.alloc().is_err());
    }

    #[test]
    fn map_flags_user_rw_is_not_executable() {
        let attrs = MapFlags::USER_RW.leaf_attrs();
        assert!(attrs.exec_never_el0);
        assert!(attrs.exec_never_el1);
    }

    #[test]
    fn map_flags_kernel_rx_is_el1_executable_only() {
        let attrs = MapFlags::KERNEL_RX.leaf_attrs();
        assert!(!attrs.exec_never_el1);
        assert!(attrs.exec_never_el0);
        assert!(attrs.global);
    }
}
