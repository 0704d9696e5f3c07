//! MMU programming: MAIR/TCR setup, TTBR switching, and TLB maintenance
//! (spec §4.2). Grounded on the teacher's `arch::aarch64::mmu` register
//! layout, adapted to this kernel's exactly-3-entry MAIR (device-nGnRnE,
//! normal write-back cacheable, normal non-cacheable).
//!
//! Every address space — including the kernel-only bootstrap context
//! used before any process exists — is a single root table walked
//! through TTBR0_EL1 with an ASID tag; [`mm::address_space`]'s level-0
//! index split (shared kernel subtree at index 0, process-private
//! mappings at index 1) means one translation regime covers both
//! ranges, so TTBR1_EL1 is never programmed and its walks are disabled
//! in TCR_EL1 (`EPD1`).

use crate::mm::{AddressSpace, PhysAddr, VirtAddr};

/// MAIR_EL1 attribute indices, matching `mm::page_table::MemoryType`'s
/// discriminant order.
const MAIR_DEVICE_NGNRNE: u64 = 0b0000_0000;
const MAIR_NORMAL_WB: u64 = 0b1111_1111;
const MAIR_NORMAL_NC: u64 = 0b0100_0100;

fn mair_value() -> u64 {
    MAIR_DEVICE_NGNRNE | (MAIR_NORMAL_WB << 8) | (MAIR_NORMAL_NC << 16)
}

/// TCR_EL1 value for a 4 KB granule, 48-bit VA, TTBR0-only layout. T0SZ =
/// 16 (48-bit VA space), inner/outer write-back cacheable, inner-
/// shareable walks, 4 KB granule, 16-bit ASIDs; `EPD1` disables TTBR1
/// walks entirely since this kernel never programs TTBR1_EL1.
fn tcr_value() -> u64 {
    const T0SZ: u64 = 16;
    const IRGN0_WBWA: u64 = 0b01 << 8;
    const ORGN0_WBWA: u64 = 0b01 << 10;
    const SH0_INNER: u64 = 0b11 << 12;
    const TG0_4K: u64 = 0b00 << 14;
    const EPD1: u64 = 1 << 23;
    const IPS_40BIT: u64 = 0b010 << 32;
    const AS_16BIT: u64 = 1 << 36;

    T0SZ | IRGN0_WBWA | ORGN0_WBWA | SH0_INNER | TG0_4K | EPD1 | IPS_40BIT | AS_16BIT
}

/// Program MAIR_EL1/TCR_EL1/TTBR0_EL1 and enable the MMU with SCTLR_EL1.
/// Must run once during boot, after the kernel identity map has been
/// built but before any code outside the identity-mapped region is
/// reached.
///
/// # Safety
/// Must be called exactly once, on the boot stack, with `boot_root`
/// covering the currently executing code and the stack in use.
pub unsafe fn enable(boot_root: PhysAddr) {
    // SAFETY: caller guarantees this runs once at boot with a valid
    // identity-mapped root table.
    unsafe {
        core::arch::asm!(
            "msr mair_el1, {mair}",
            "msr tcr_el1, {tcr}",
            "msr ttbr0_el1, {ttbr0}",
            "isb",
            "mrs {sctlr}, sctlr_el1",
            "orr {sctlr}, {sctlr}, #1",
            "msr sctlr_el1, {sctlr}",
            "isb",
            mair = in(reg) mair_value(),
            tcr = in(reg) tcr_value(),
            ttbr0 = in(reg) boot_root.as_u64(),
            sctlr = out(reg) _,
        );
    }
}

/// Switch TTBR0_EL1 (and its ASID tag) to `space`, for dispatching into a
/// different process's user mappings. The shared kernel/device subtree is
/// mirrored at level-0 index 0 of every root table, so it stays reachable
/// across the switch.
pub fn switch_to(space: &AddressSpace) {
    let ttbr0 = space.root().as_u64() | ((space.asid() as u64) << 48);
    // SAFETY: `space.root()` is a live, fully-built root table owned by
    // `space`, which outlives this switch.
    unsafe {
        core::arch::asm!(
            "msr ttbr0_el1, {ttbr0}",
            "isb",
            ttbr0 = in(reg) ttbr0,
        );
    }
}

/// Invalidate the single TLB entry for `virt` tagged with `asid` (spec
/// §4.2's `unmap`: "invalidates only the corresponding TLB entry").
pub fn invalidate_tlb_va(asid: u16, virt: VirtAddr) {
    let arg = ((asid as u64) << 48) | (virt.as_u64() >> 12);
    // SAFETY: TLBI VAE1IS is a non-destructive maintenance instruction;
    // DSB/ISB ensure the invalidation is visible before any following
    // access that might rely on the old or new translation.
    unsafe {
        core::arch::asm!(
            "tlbi vae1is, {arg}",
            "dsb ish",
            "isb",
            arg = in(reg) arg,
        );
    }
}

/// Invalidate every TLB entry tagged with `asid` (spec §4.2's `destroy`,
/// called after the ASID is freed so no stale entry can alias a reissued
/// ASID).
pub fn invalidate_tlb_asid(asid: u16) {
    let arg = (asid as u64) << 48;
    // SAFETY: see `invalidate_tlb_va`.
    unsafe {
        core::arch::asm!(
            "tlbi aside1is, {arg}",
            "dsb ish",
            "isb",
            arg = in(reg) arg,
        );
    }
}
