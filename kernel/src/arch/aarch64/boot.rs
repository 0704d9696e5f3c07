//! Entry point: primary-CPU selection, stack setup, and BSS zeroing
//! before handing off to `kernel_main` (spec §4.1's implicit boot
//! sequence — the spec itself starts at "frame allocator sees usable
//! RAM", so everything here exists only to reach that point).
//!
//! Grounded on the teacher's `arch::aarch64::boot`/`entry` split (a
//! `global_asm!` stub that clears BSS and falls into a Rust entry
//! function), adapted for this kernel's single-CPU model: any secondary
//! core QEMU starts is parked at `wfe` forever (Non-goals: no SMP).

use core::arch::global_asm;

global_asm!(
    ".section .text.boot",
    ".global _start",
    "_start:",
    "mrs x0, mpidr_el1",
    "and x0, x0, #0xff",
    "cbz x0, 0f",
    "1:",
    "wfe",
    "b 1b",
    "0:",
    "adrp x0, __boot_stack_top",
    "add x0, x0, #:lo12:__boot_stack_top",
    "mov sp, x0",
    "b {entry}",
    entry = sym boot_entry,
);

extern "C" {
    static mut __bss_start: u8;
    static mut __bss_end: u8;
}

extern "C" fn boot_entry() -> ! {
    // SAFETY: runs once, single-threaded, before any other code touches
    // these linker-provided symbols.
    unsafe {
        let start = &raw mut __bss_start;
        let end = &raw mut __bss_end;
        let len = end as usize - start as usize;
        core::ptr::write_bytes(start, 0, len);
    }
    crate::kernel_main()
}
