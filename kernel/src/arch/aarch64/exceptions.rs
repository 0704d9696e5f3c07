//! Exception vector table, syscall/fault/IRQ dispatch, and the deferred
//! context-switch epilogue (spec §4.3, §4.4, §4.6).
//!
//! This kernel never switches context inline (`sched::schedule`'s doc
//! comment) — every switch happens here, at the exception-return
//! boundary, by changing which thread's kernel stack the final register
//! restore reads from. A vector stub saves the full [`ExceptionFrame`] on
//! the current thread's kernel stack, calls the matching Rust handler,
//! then always calls [`after_dispatch`] before restoring registers and
//! issuing `eret` — `after_dispatch` records the just-saved frame as the
//! current thread's resume point, consults the reschedule flag, and (on
//! a switch) hands back a different stack pointer to restore from.

use core::arch::{asm, global_asm};

use super::context::ExceptionFrame;
use crate::sched::ThreadId;

/// Disable IRQs at the current exception level (spec's brief interrupt
/// masking windows around table/queue mutation that can't take a lock
/// reentrantly, and the fatal-panic path).
pub fn disable_irqs() {
    // SAFETY: DAIFSet only masks this CPU's own interrupt delivery; it has
    // no effect on memory or other CPU state.
    unsafe { asm!("msr daifset, #2", options(nostack, preserves_flags)) };
}

/// Re-enable IRQs at the current exception level.
pub fn enable_irqs() {
    // SAFETY: see `disable_irqs`.
    unsafe { asm!("msr daifclr, #2", options(nostack, preserves_flags)) };
}

/// Install the vector table and leave IRQs masked; the caller unmasks
/// them once the scheduler and first thread are ready.
pub fn init() {
    // SAFETY: `vector_table` is a 2 KiB-aligned symbol emitted by the
    // `global_asm!` block below, valid for the lifetime of the kernel.
    unsafe {
        asm!(
            "adrp {tmp}, {vt}",
            "add {tmp}, {tmp}, #:lo12:{vt}",
            "msr vbar_el1, {tmp}",
            "isb",
            tmp = out(reg) _,
            vt = sym vector_table,
        );
    }
}

const ESR_EC_SHIFT: u32 = 26;
const ESR_EC_SVC64: u32 = 0b010101;

/// Synchronous exception handler: SVC dispatches to the syscall layer,
/// anything else is a fault taken from EL0 (data/instruction abort,
/// undefined instruction) or — fatally, per spec §7 — from EL1 itself.
#[no_mangle]
extern "C" fn exc_sync_handler(frame: *mut ExceptionFrame) {
    // SAFETY: the vector stub always passes a pointer to a live,
    // exclusively-owned frame on the current thread's kernel stack.
    let frame = unsafe { &mut *frame };
    let esr: u64;
    // SAFETY: ESR_EL1 is a read-only system register, always valid to read.
    unsafe { asm!("mrs {0}, esr_el1", out(reg) esr) };
    let ec = ((esr >> ESR_EC_SHIFT) & 0x3f) as u32;

    if ec == ESR_EC_SVC64 {
        crate::syscall::dispatch(frame);
        return;
    }

    let far: u64;
    // SAFETY: FAR_EL1 is a read-only system register, always valid to read.
    unsafe { asm!("mrs {0}, far_el1", out(reg) far) };

    if frame.spsr_el1 & 0xf == 0 {
        // Taken from EL0: kill the offending process rather than the
        // kernel (spec §7's EL0 fault policy).
        log::warn!("EL0 fault: ec={ec:#x} far={far:#018x} elr={:#018x}", frame.elr_el1);
        crate::process::exit_current(139);
    } else {
        crate::error::fatal("synchronous (EL1)", far as usize, frame.elr_el1 as usize);
    }
}

/// IRQ handler: acknowledge via the GIC and route the one interrupt
/// source this kernel drives (the generic timer) to the scheduler's tick
/// (spec §4.4's tick-driven preemption).
#[no_mangle]
extern "C" fn exc_irq_handler(_frame: *mut ExceptionFrame) {
    if let Some(id) = super::gic::handle_irq() {
        if id == super::timer::irq_id() {
            super::timer::on_tick();
            crate::sched::on_timer_tick();
        }
        super::gic::eoi(id);
    }
}

/// Fatal by construction: SError and any exception taken from a lower EL
/// using AArch32 are both outside this kernel's supported configuration.
#[no_mangle]
extern "C" fn exc_serror_handler(frame: *mut ExceptionFrame) {
    // SAFETY: see `exc_sync_handler`.
    let frame = unsafe { &*frame };
    crate::error::fatal("serror", 0, frame.elr_el1 as usize);
}

/// Run after every handler, before the vector stub restores registers and
/// returns: record the just-saved frame as the running thread's resume
/// point, perform the deferred context switch if one was requested, and
/// return the stack pointer the stub should restore from (spec §4.4's
/// deferred-reschedule policy; spec §4.6's blocked-syscall return
/// sentinel).
#[no_mangle]
extern "C" fn after_dispatch(frame: *mut ExceptionFrame) -> u64 {
    let prev = crate::sched::current();
    crate::sched::with_thread_mut(prev, |t| t.kernel_sp = frame as u64);

    if !crate::sched::take_reschedule() {
        return frame as u64;
    }

    let (prev_id, next_id) = crate::sched::schedule();
    switch_address_space(prev_id, next_id);

    let next_sp = crate::sched::with_thread(next_id, |t| t.kernel_sp).unwrap_or(frame as u64);

    let pending = crate::sched::with_thread_mut(next_id, |t| t.pending_return.take()).flatten();
    if let Some(values) = pending {
        // SAFETY: `next_sp` is `next_id`'s own saved (or synthesized
        // first-run) frame, not currently aliased by any other thread.
        let next_frame = unsafe { &mut *(next_sp as *mut ExceptionFrame) };
        next_frame.x[0] = values[0];
        next_frame.x[1] = values[1];
        next_frame.x[2] = values[2];
    }

    next_sp
}

fn switch_address_space(prev: ThreadId, next: ThreadId) {
    if prev == next {
        return;
    }
    let next_owner = crate::sched::with_thread(next, |t| t.owner).flatten();
    if let Some(pid) = next_owner {
        crate::process::with_process_mut(pid, |p| super::mmu::switch_to(&p.address_space));
    }
}

// ---------------------------------------------------------------------
// Vector table
// ---------------------------------------------------------------------
//
// AArch64 requires a 2 KiB-aligned table of 16 entries (4 sources x 4
// originating states), each 0x80 bytes. This kernel only ever runs with
// one translation regime at EL1h and services EL0 user threads, so only
// the "current EL with SP0" entries (used transiently during the boot
// stub) and "lower EL, AArch64" entries (used by every user thread) do
// real work; the remaining slots are wired to the same fatal handler a
// genuine configuration error would hit.

macro_rules! save_and_call {
    ($handler:ident) => {
        concat!(
            "sub sp, sp, #272\n",
            "stp x0, x1, [sp, #0]\n",
            "stp x2, x3, [sp, #16]\n",
            "stp x4, x5, [sp, #32]\n",
            "stp x6, x7, [sp, #48]\n",
            "stp x8, x9, [sp, #64]\n",
            "stp x10, x11, [sp, #80]\n",
            "stp x12, x13, [sp, #96]\n",
            "stp x14, x15, [sp, #112]\n",
            "stp x16, x17, [sp, #128]\n",
            "stp x18, x19, [sp, #144]\n",
            "stp x20, x21, [sp, #160]\n",
            "stp x22, x23, [sp, #176]\n",
            "stp x24, x25, [sp, #192]\n",
            "stp x26, x27, [sp, #208]\n",
            "stp x28, x29, [sp, #224]\n",
            "str x30, [sp, #240]\n",
            "mrs x0, sp_el0\n",
            "mrs x1, elr_el1\n",
            "mrs x2, spsr_el1\n",
            "stp x0, x1, [sp, #248]\n",
            "str x2, [sp, #264]\n",
            "mov x0, sp\n",
            "bl ", stringify!($handler), "\n",
            "mov x0, sp\n",
            "bl after_dispatch\n",
            "mov sp, x0\n",
            "ldp x1, x2, [sp, #248]\n",
            "msr sp_el0, x1\n",
            "msr elr_el1, x2\n",
            "ldr x2, [sp, #264]\n",
            "msr spsr_el1, x2\n",
            "ldp x0, x1, [sp, #0]\n",
            "ldp x2, x3, [sp, #16]\n",
            "ldp x4, x5, [sp, #32]\n",
            "ldp x6, x7, [sp, #48]\n",
            "ldp x8, x9, [sp, #64]\n",
            "ldp x10, x11, [sp, #80]\n",
            "ldp x12, x13, [sp, #96]\n",
            "ldp x14, x15, [sp, #112]\n",
            "ldp x16, x17, [sp, #128]\n",
            "ldp x18, x19, [sp, #144]\n",
            "ldp x20, x21, [sp, #160]\n",
            "ldp x22, x23, [sp, #176]\n",
            "ldp x24, x25, [sp, #192]\n",
            "ldp x26, x27, [sp, #208]\n",
            "ldp x28, x29, [sp, #224]\n",
            "ldr x30, [sp, #240]\n",
            "add sp, sp, #272\n",
            "eret\n",
        )
    };
}

// Each vector entry gets only 128 bytes — nowhere near enough for a full
// register save — so every entry is just a one-instruction branch to one
// of the three out-of-line trampolines below, which hold the real
// save/dispatch/restore sequence exactly once each.
global_asm!(
    ".section .text.vectors",
    ".balign 2048",
    ".global vector_table",
    "vector_table:",
    // Current EL, SP0 (unused in practice: the kernel never takes an
    // exception on SP_EL0 after boot hands off to SP_EL1 per thread).
    ".balign 128", "b sync_trampoline",
    ".balign 128", "b irq_trampoline",
    ".balign 128", "b serror_trampoline",
    ".balign 128", "b serror_trampoline",
    // Current EL, SPx: kernel-mode exceptions (preempting another
    // exception handler, or a fault while servicing a syscall).
    ".balign 128", "b sync_trampoline",
    ".balign 128", "b irq_trampoline",
    ".balign 128", "b serror_trampoline",
    ".balign 128", "b serror_trampoline",
    // Lower EL, AArch64: every user thread's SVC, fault, and timer IRQ.
    ".balign 128", "b sync_trampoline",
    ".balign 128", "b irq_trampoline",
    ".balign 128", "b serror_trampoline",
    ".balign 128", "b serror_trampoline",
    // Lower EL, AArch32: unsupported, fatal.
    ".balign 128", "b serror_trampoline",
    ".balign 128", "b serror_trampoline",
    ".balign 128", "b serror_trampoline",
    ".balign 128", "b serror_trampoline",
    ".balign 128",
    "sync_trampoline:", save_and_call!(exc_sync_handler),
    "irq_trampoline:", save_and_call!(exc_irq_handler),
    "serror_trampoline:", save_and_call!(exc_serror_handler),
);
