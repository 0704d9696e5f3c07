//! ARM generic timer driver: the tick source behind preemption (spec §4.4)
//! and behind `GET_TICKS`/log timestamps. Grounded on the teacher's
//! `arch::aarch64::timer`, trimmed to the single-CPU physical timer this
//! kernel drives at a fixed [`crate::config::TICK_HZ`].

use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::TICK_HZ;

static TICKS: AtomicU64 = AtomicU64::new(0);
static TIMER_IRQ: u32 = 30; // CNTP_EL0 physical timer PPI on QEMU virt.

fn cntfrq() -> u64 {
    let freq: u64;
    // SAFETY: CNTFRQ_EL0 is a read-only system register available at EL1.
    unsafe { core::arch::asm!("mrs {0}, cntfrq_el0", out(reg) freq) };
    freq
}

fn set_compare(ticks_from_now: u64) {
    // SAFETY: CNTP_TVAL_EL0 only schedules the next physical timer
    // interrupt; it has no effect outside this CPU's timer state.
    unsafe { core::arch::asm!("msr cntp_tval_el0, {0}", in(reg) ticks_from_now) };
}

fn enable_timer() {
    // SAFETY: CNTP_CTL_EL0 bit 0 enables the physical timer; bit 1 (IMASK)
    // left clear so its interrupt reaches the GIC.
    unsafe { core::arch::asm!("msr cntp_ctl_el0, {0}", in(reg) 1u64) };
}

/// Program the physical timer for [`crate::config::TICK_HZ`] and enable
/// its GIC line. Must run once during boot, after [`super::gic::init`].
pub fn init() {
    let freq = cntfrq();
    let period = freq / TICK_HZ;
    set_compare(period);
    enable_timer();
    let _ = super::gic::enable_irq(TIMER_IRQ);
    let _ = super::gic::set_irq_priority(TIMER_IRQ, 0x00);
}

/// Rearm the timer for the next tick and bump the tick counter. Called
/// from the IRQ handler after acknowledging [`TIMER_IRQ`].
pub fn on_tick() {
    let freq = cntfrq();
    let period = freq / TICK_HZ;
    set_compare(period);
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// The GIC interrupt id this driver owns, so the IRQ dispatcher can route
/// to [`on_tick`] without a per-device registry.
pub fn irq_id() -> u32 {
    TIMER_IRQ
}

/// Ticks elapsed since boot, at [`crate::config::TICK_HZ`] resolution.
/// Backs the `GET_TICKS` syscall and every log entry's timestamp.
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}
