//! AArch64 platform support for QEMU `virt` with a Cortex-A72 (spec's
//! target platform). Grounded on the teacher's `arch::aarch64` module
//! split (boot/context/exceptions/gic/timer/uart as sibling modules
//! under one arch namespace), trimmed to this kernel's single-CPU,
//! single-translation-regime model.

pub mod boot;
pub mod context;
pub mod exceptions;
pub mod gic;
pub mod mmu;
pub mod timer;
pub mod uart;

use crate::config::PAGE_SIZE;
use crate::mm::{MapFlags, PhysAddr};

/// Physical RAM base on QEMU `virt`.
pub const RAM_BASE: u64 = 0x4000_0000;
/// Default `-m` RAM size QEMU `virt` boots with when unspecified.
pub const DEFAULT_RAM_SIZE: u64 = 128 * 1024 * 1024;

extern "C" {
    static __kernel_end: u8;
}

/// Physical address one past the last byte the linker places (image code,
/// data, bss, and the boot stack) — everything below this that the boot
/// loader already occupies, before the frame allocator ever runs.
pub fn kernel_image_end() -> u64 {
    // SAFETY: `__kernel_end` is a linker-provided symbol; only its address,
    // never its value, is read here.
    unsafe { &__kernel_end as *const u8 as u64 }
}

pub(crate) const UART_BASE: u64 = 0x0900_0000;
pub(crate) const UART_SIZE: u64 = PAGE_SIZE as u64;
pub(crate) const GICD_BASE: u64 = 0x0800_0000;
pub(crate) const GICC_BASE: u64 = 0x0801_0000;
pub(crate) const GIC_SIZE: u64 = PAGE_SIZE as u64;

/// Bring up the platform: identity-map all of managed RAM and the device
/// registers, enable the MMU, install the vector table, and start the
/// GIC and timer. Interrupts remain masked on return; the caller unmasks
/// them once the first thread is ready to run.
///
/// The whole RAM range is identity-mapped, not just the kernel image: the
/// frame allocator hands out frames from anywhere in that range (page
/// tables, thread kernel stacks, a spawned process's code/stack pages),
/// and the kernel only ever touches a frame's contents through its own
/// identity-mapped view of it (see `mm::address_space::table_at`), never
/// through a process's user mapping.
pub fn init(ram_size: u64) {
    let mapped_size = ram_size.min(crate::config::MAX_RAM_BYTES);
    crate::mm::address_space::map_kernel_identity(
        PhysAddr::new(RAM_BASE),
        mapped_size,
        MapFlags::KERNEL_RWX,
    )
    .expect("failed to identity-map RAM");
    crate::mm::address_space::map_kernel_identity(
        PhysAddr::new(UART_BASE),
        UART_SIZE,
        MapFlags::DEVICE_RW,
    )
    .expect("failed to map UART");
    crate::mm::address_space::map_kernel_identity(
        PhysAddr::new(GICD_BASE),
        GIC_SIZE,
        MapFlags::DEVICE_RW,
    )
    .expect("failed to map GICD");
    crate::mm::address_space::map_kernel_identity(
        PhysAddr::new(GICC_BASE),
        GIC_SIZE,
        MapFlags::DEVICE_RW,
    )
    .expect("failed to map GICC");

    let boot_root = crate::mm::address_space::boot_root();
    // SAFETY: every range this kernel ever touches before or after this
    // call is covered by the identity map just built above.
    unsafe { mmu::enable(boot_root) };

    exceptions::init();
    gic::init().expect("GIC init failed");
    timer::init();
}

/// Halt this CPU forever. Used by the fatal-panic path and by the boot
/// stub's secondary-core park loop.
pub fn halt_forever() -> ! {
    loop {
        // SAFETY: WFE is a non-destructive power-saving hint.
        unsafe { core::arch::asm!("wfe", options(nomem, nostack, preserves_flags)) };
    }
}
