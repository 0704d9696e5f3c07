//! The trap frame saved on a thread's kernel stack at every exception
//! entry, and the machinery to stage a never-yet-run thread's first one
//! (spec §4.3/§4.4). This kernel never switches context inline (see
//! `sched::schedule`'s doc comment) — every switch happens at an
//! exception boundary, so the full register state a thread needs to
//! resume lives in this one saved frame rather than in a separate
//! callee-saved-only context block.
//!
//! Grounded on the teacher's `arch::aarch64::context::Context` register
//! set (GPRs, SP, PC/ELR, SPSR, TTBR0), narrowed to what a single save
//! at exception entry actually captures — no separate FPU block, since
//! this kernel never saves FP/NEON state across a switch (Non-goals).

use crate::config::PAGE_SIZE;

/// EL0t, all DAIF bits clear: a user thread resumes with interrupts
/// enabled.
const SPSR_EL0T: u64 = 0x0000_0000;
/// EL1h, all DAIF bits clear: a kernel-only thread resumes with
/// interrupts enabled, using SP_EL1 rather than SP_EL0.
const SPSR_EL1H: u64 = 0x0000_0005;

/// Full register state saved by the vector-table entry stubs before
/// calling into Rust, and restored immediately before `eret`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ExceptionFrame {
    /// x0-x30 (x30 is the link register at the point of exception).
    pub x: [u64; 31],
    pub sp_el0: u64,
    pub elr_el1: u64,
    pub spsr_el1: u64,
}

impl ExceptionFrame {
    const fn empty() -> Self {
        Self {
            x: [0; 31],
            sp_el0: 0,
            elr_el1: 0,
            spsr_el1: 0,
        }
    }
}

/// Size in bytes of a saved frame; the vector stubs reserve exactly this
/// much stack space per entry.
pub const FRAME_SIZE: usize = core::mem::size_of::<ExceptionFrame>();

const _: () = assert!(FRAME_SIZE % 16 == 0, "ExceptionFrame must be 16-byte aligned");

/// Build the initial saved frame for a thread that has never run, at the
/// top of its kernel stack, and return the stack pointer value to store
/// in `Thread::kernel_sp` (spec §4.4's "Create thread": a brand new
/// thread resumes through the same exception-return epilogue as any
/// preempted one, just with a synthesized first frame).
///
/// # Safety
/// `kernel_stack_top` must be the exclusive top of a `KERNEL_STACK_PAGES`
/// kernel stack belonging to no other live thread.
pub unsafe fn prepare_initial_frame(
    kernel_stack_top: u64,
    entry: u64,
    user_sp: u64,
    is_user: bool,
) -> u64 {
    let frame_addr = (kernel_stack_top as usize - FRAME_SIZE) as *mut ExceptionFrame;
    let mut frame = ExceptionFrame::empty();
    frame.elr_el1 = entry;
    frame.sp_el0 = user_sp;
    frame.spsr_el1 = if is_user { SPSR_EL0T } else { SPSR_EL1H };
    // SAFETY: caller guarantees `kernel_stack_top` names the exclusive top
    // of a live, writable kernel stack at least `FRAME_SIZE` bytes deep.
    unsafe { frame_addr.write(frame) };
    frame_addr as u64
}

/// Number of bytes in a thread's kernel stack, derived from
/// [`crate::config::KERNEL_STACK_PAGES`].
pub const KERNEL_STACK_SIZE: usize = crate::config::KERNEL_STACK_PAGES * PAGE_SIZE;
