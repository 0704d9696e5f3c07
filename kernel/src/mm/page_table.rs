//! ARMv8-A long-descriptor page tables: 4 KB granule, 4 levels, 48-bit VA
//! (spec §4.2). Grounded on the teacher's `PageTable`/`PageTableEntry` shape
//! in `mm/page_table.rs` (512-entry array, `#[repr(transparent)]` `u64`
//! entry, `Index`/`IndexMut`), with the entry's bit layout replaced by the
//! real ARMv8 stage-1 descriptor fields the teacher's x86_64-shaped
//! placeholder never modeled.

use core::ops::{Index, IndexMut};

use super::PhysAddr;

/// Number of entries in one level of the table (9 VA bits per level).
pub const ENTRIES: usize = 512;

const ADDR_MASK: u64 = 0x0000_FFFF_FFFF_F000;

bitflags::bitflags! {
    /// Raw ARMv8 stage-1 descriptor bits below the output address and above
    /// bit 1, excluding the 2-bit AP/SH fields and 3-bit AttrIndx field
    /// (those are narrower than one bit and are packed with the shift
    /// helpers below instead of as flags).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescBits: u64 {
        /// Bit 0: descriptor is valid.
        const VALID     = 1 << 0;
        /// Bit 1: table descriptor (levels 0-2) / page descriptor (level 3).
        /// Clear at levels 0-2 means block descriptor.
        const TABLE_OR_PAGE = 1 << 1;
        /// Bit 10: access flag. A translation fault is taken on any access
        /// to a mapping with AF clear; this kernel always sets it at map
        /// time since it never implements access-bit based reclaim.
        const AF        = 1 << 10;
        /// Bit 11: not-global. Clear (global) for kernel mappings so they
        /// survive an ASID-tagged TLB without invalidation; set for every
        /// user mapping so a context switch cannot leak another process's
        /// translation.
        const NG        = 1 << 11;
        /// Bit 53: privileged execute-never.
        const PXN       = 1 << 53;
        /// Bit 54: unprivileged (EL0) execute-never.
        const UXN       = 1 << 54;
    }
}

const AP_SHIFT: u64 = 6;
const AP_MASK: u64 = 0b11 << AP_SHIFT;
const SH_SHIFT: u64 = 8;
const SH_MASK: u64 = 0b11 << SH_SHIFT;
const ATTR_IDX_SHIFT: u64 = 2;
const ATTR_IDX_MASK: u64 = 0b111 << ATTR_IDX_SHIFT;

/// AP\[2:1\] field: read/write permission and EL0 accessibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPerm {
    /// EL1 read/write, EL0 no access.
    KernelRw,
    /// EL1 read-only, EL0 no access.
    KernelRo,
    /// EL1 read/write, EL0 read/write.
    UserRw,
    /// EL1 read-only, EL0 read-only.
    UserRo,
}

impl AccessPerm {
    const fn bits(self) -> u64 {
        match self {
            AccessPerm::KernelRw => 0b00 << AP_SHIFT,
            AccessPerm::UserRw => 0b01 << AP_SHIFT,
            AccessPerm::KernelRo => 0b10 << AP_SHIFT,
            AccessPerm::UserRo => 0b11 << AP_SHIFT,
        }
    }
}

/// Shareability field. Normal memory is inner-shareable on this single-core
/// target; device memory is outer-shareable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shareability {
    NonShareable,
    OuterShareable,
    InnerShareable,
}

impl Shareability {
    const fn bits(self) -> u64 {
        match self {
            Shareability::NonShareable => 0b00 << SH_SHIFT,
            Shareability::OuterShareable => 0b10 << SH_SHIFT,
            Shareability::InnerShareable => 0b11 << SH_SHIFT,
        }
    }
}

/// Index into MAIR_EL1, programmed by `arch::aarch64::mmu::init` with three
/// entries matching spec §4.2's TCR/MAIR programming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// MAIR index 0: normal, write-back read/write-allocate cacheable
    /// memory. Used for all ordinary code and data mappings.
    Normal,
    /// MAIR index 1: device-nGnRnE memory, for MMIO registers.
    Device,
    /// MAIR index 2: normal, non-cacheable memory, for DMA buffers shared
    /// with devices that do not snoop the cache.
    NormalNonCacheable,
}

impl MemoryType {
    const fn attr_index(self) -> u64 {
        match self {
            MemoryType::Normal => 0,
            MemoryType::Device => 1,
            MemoryType::NormalNonCacheable => 2,
        }
    }
}

/// The fully-resolved set of attributes a leaf descriptor carries, derived
/// from [`super::address_space::MapFlags`] at the point a mapping is
/// installed.
#[derive(Debug, Clone, Copy)]
pub struct LeafAttrs {
    pub access: AccessPerm,
    pub shareability: Shareability,
    pub mem_type: MemoryType,
    pub exec_never_el0: bool,
    pub exec_never_el1: bool,
    pub global: bool,
}

/// A single page-table entry: a table pointer (levels 0-2), a 4 KB page
/// descriptor (level 3), or the empty/invalid state.
#[derive(Debug, Clone, Copy)]
#[repr(transparent)]
pub struct PageTableEntry {
    raw: u64,
}

impl PageTableEntry {
    pub const fn empty() -> Self {
        Self { raw: 0 }
    }

    pub const fn is_valid(&self) -> bool {
        self.raw & DescBits::VALID.bits() != 0
    }

    /// True for a table descriptor (levels 0-2 pointing at the next-level
    /// table) or a level-3 page descriptor; false for an invalid entry.
    pub const fn is_table_or_page(&self) -> bool {
        self.raw & DescBits::TABLE_OR_PAGE.bits() != 0
    }

    pub fn output_addr(&self) -> PhysAddr {
        PhysAddr::new(self.raw & ADDR_MASK)
    }

    /// Install a table descriptor pointing at the next-level table's
    /// physical address (levels 0-2).
    pub fn set_table(&mut self, next_level: PhysAddr) {
        self.raw = (next_level.as_u64() & ADDR_MASK)
            | DescBits::VALID.bits()
            | DescBits::TABLE_OR_PAGE.bits();
    }

    /// Install a level-3 page descriptor mapping `phys` with `attrs`.
    pub fn set_page(&mut self, phys: PhysAddr, attrs: LeafAttrs) {
        let mut bits = DescBits::VALID | DescBits::TABLE_OR_PAGE | DescBits::AF;
        if attrs.global {
            // Global entries leave NG clear.
        } else {
            bits |= DescBits::NG;
        }
        if attrs.exec_never_el1 {
            bits |= DescBits::PXN;
        }
        if attrs.exec_never_el0 {
            bits |= DescBits::UXN;
        }
        self.raw = (phys.as_u64() & ADDR_MASK)
            | bits.bits()
            | (attrs.access.bits() & AP_MASK)
            | (attrs.shareability.bits() & SH_MASK)
            | ((attrs.mem_type.attr_index() << ATTR_IDX_SHIFT) & ATTR_IDX_MASK);
    }

    pub fn clear(&mut self) {
        self.raw = 0;
    }
}

impl Default for PageTableEntry {
    fn default() -> Self {
        Self::empty()
    }
}

/// One 4 KB level of the translation table: 512 64-bit descriptors, naturally
/// page-aligned so its own physical address is a valid table-descriptor
/// output address.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES],
}

impl PageTable {
    pub const fn new() -> Self {
        Self {
            entries: [PageTableEntry::empty(); ENTRIES],
        }
    }

    pub fn zero(&mut self) {
        for e in &mut self.entries {
            e.clear();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageTableEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PageTableEntry> {
        self.entries.iter_mut()
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<usize> for PageTable {
    type Output = PageTableEntry;
    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IndexMut<usize> for PageTable {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    #[test]
    fn empty_entry_is_invalid() {
        let e = PageTableEntry::empty();
        assert!(!e.is_valid());
        assert!(!e.is_table_or_page());
    }

    #[test]
    fn table_descriptor_round_trips_address() {
        let mut e = PageTableEntry::empty();
        let phys = PhysAddr::new(0x4020_1000);
        e.set_table(phys);
        assert!(e.is_valid());
        assert_eq!(e.output_addr(), phys);
    }

    #[test]
    fn page_descriptor_carries_attrs() {
        let mut e = PageTableEntry::empty();
        let phys = PhysAddr::new(0x8000_0000);
        e.set_page(
            phys,
            LeafAttrs {
                access: AccessPerm::UserRw,
                shareability: Shareability::InnerShareable,
                mem_type: MemoryType::Normal,
                exec_never_el0: false,
                exec_never_el1: true,
                global: false,
            },
        );
        assert!(e.is_valid());
        assert!(e.is_table_or_page());
        assert_eq!(e.output_addr(), phys);
        assert_ne!(e.raw & DescBits::NG.bits(), 0);
        assert_ne!(e.raw & DescBits::PXN.bits(), 0);
        assert_eq!(e.raw & DescBits::UXN.bits(), 0);
    }

    #[test]
    fn clear_invalidates() {
        let mut e = PageTableEntry::empty();
        e.set_table(PhysAddr::new(0x1000));
        e.clear();
        assert!(!e.is_valid());
    }
}
