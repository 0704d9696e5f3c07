//! Preemptive microkernel for 64-bit ARM (QEMU `virt`, Cortex-A72): frame
//! allocator, 4-level page tables, priority-based scheduler, synchronous
//! rendezvous IPC, and a fixed syscall ABI.
//!
//! `#![no_std]`, no heap: every major table is a fixed-capacity array
//! behind a spinlock, per `config`'s compile-time capacities. Grounded on
//! the teacher's crate-root layout (`lib.rs` hosting the module tree and
//! `kernel_main`, `main.rs` a thin binary shim).

#![no_std]

pub mod arch;
pub mod config;
pub mod devices;
pub mod error;
pub mod ipc;
pub mod klog;
pub mod loader;
pub mod mm;
pub mod process;
pub mod sched;
pub mod sync;
pub mod syscall;

use mm::PhysAddr;

/// Boot id of the first user process this kernel ever spawns (spec's
/// worked hello round-trip, test scenario S1).
const INIT_BINARY_ID: u64 = 0;

/// Bring every subsystem up in dependency order and fall into the idle
/// loop. Called once, on the boot stack, by `arch::aarch64::boot`.
///
/// Order matters: the logger first so every later step can log; the frame
/// allocator and kernel address space before anything that allocates a
/// frame; the boot page tables reserved before any other allocation can
/// claim their frames; the scheduler and process table before a thread or
/// process can exist; IPC before `init`'s first thread could plausibly
/// reach a `SEND`/`RECV`; interrupts unmasked only once the scheduler has
/// something ready to run.
pub fn kernel_main() -> ! {
    klog::init();
    log::info!("booting");

    let ram_base = PhysAddr::new(arch::aarch64::RAM_BASE);
    let ram_size = arch::aarch64::DEFAULT_RAM_SIZE;

    mm::init(ram_base, ram_size);
    reserve_boot_frames(ram_base);

    arch::aarch64::init(ram_size);
    sched::init();
    process::init();
    ipc::init();

    spawn_init();

    log::info!("starting scheduler");
    arch::aarch64::exceptions::enable_irqs();
    arch::aarch64::halt_forever();
}

/// Protect every frame the boot loader already occupies — kernel image
/// code/data/bss, the boot stack — from ever being handed out by the frame
/// allocator. None of this was allocated through `frame_allocator::alloc`,
/// so the bitmap has no other way to know it's in use.
fn reserve_boot_frames(ram_base: PhysAddr) {
    let end = arch::aarch64::kernel_image_end();
    let mut addr = ram_base.as_u64();
    while addr < end {
        mm::frame_allocator::reserve(PhysAddr::new(addr));
        addr += config::PAGE_SIZE as u64;
    }
}

/// Spawn the first user process from the build-time binary registry.
/// Failure here is fatal: a kernel that cannot start its own init process
/// has nothing left to run.
fn spawn_init() {
    let binary = loader::lookup_binary(INIT_BINARY_ID)
        .unwrap_or_else(|e| panic!("failed to resolve init binary: {e}"));
    process::create_user_process(None, binary.code, binary.entry_offset)
        .unwrap_or_else(|e| panic!("failed to spawn init process: {e}"));
}

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    arch::aarch64::exceptions::disable_irqs();
    log::error!("*** RUST PANIC ***\n  {info}");
    arch::aarch64::halt_forever();
}
