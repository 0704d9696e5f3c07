//! Compile-time capacities for the kernel's fixed-size tables.
//!
//! Every major table in this kernel (frame bitmap aside) is a fixed-capacity
//! array rather than a heap-backed collection, per the data model's "fixed
//! capacity table entry" requirement. Centralizing the capacities here keeps
//! the limits visible in one place instead of scattered across modules.

/// Page size in bytes, used throughout the memory subsystem.
pub const PAGE_SIZE: usize = 4096;

/// Maximum number of live processes.
pub const MAX_PROCESSES: usize = 64;

/// Maximum number of live threads (across all processes, plus the idle
/// thread).
pub const MAX_THREADS: usize = 128;

/// Maximum number of memory regions tracked per process.
pub const MAX_MEMORY_REGIONS: usize = 16;

/// Maximum number of IPC endpoints. Endpoint 0 is reserved invalid and
/// endpoint 1 is reserved for the kernel (spec §3), so usable ids start at 2.
pub const MAX_ENDPOINTS: usize = 64;

/// Maximum number of senders that may queue, blocked, on a single endpoint
/// before `send` returns `WOULD_BLOCK`. A parameter, not a contract (spec §9
/// open question 4).
pub const MAX_SENDERS_PER_ENDPOINT: usize = 8;

/// Maximum number of address-space intermediate (page-table) pages tracked
/// per process, used by `AddressSpace::destroy` to free exactly the pages
/// this process allocated without touching the shared kernel subtree.
pub const MAX_TABLE_PAGES: usize = 64;

/// Number of ready-queue priority levels.
pub const NUM_PRIORITIES: usize = 5;

/// Depth of each per-priority ready queue.
pub const READY_QUEUE_DEPTH: usize = MAX_THREADS;

/// Timer tick rate driving preemption, in Hz.
pub const TICK_HZ: u64 = 100;

/// Per-priority time slices, in timer ticks. Index matches
/// [`crate::sched::Priority`] discriminant order.
pub const TIME_SLICES: [u32; NUM_PRIORITIES] = [100, 50, 20, 10, 1];

/// Fixed user-space virtual address at which a spawned process's code image
/// is mapped. Lives in page-table level-0 index 1, distinct from the
/// kernel/device identity region in index 0 (see `mm::address_space`).
pub const USER_CODE_BASE: u64 = 0x0000_0080_0000_0000;

/// Fixed user-space virtual address of the top of the user stack; the stack
/// grows down from here. Same level-0 index as `USER_CODE_BASE`.
pub const USER_STACK_TOP: u64 = 0x0000_00FF_FFFF_F000;

/// Number of 4 KiB pages given to a new process's user stack.
pub const USER_STACK_PAGES: usize = 4;

/// Number of 4 KiB pages given to a thread's kernel-mode stack (used only
/// while running exception handlers on behalf of that thread).
pub const KERNEL_STACK_PAGES: usize = 4;

/// Fixed user-space virtual base at which `MAP_DEVICE` maps allow-listed
/// device regions. Same level-0 index as `USER_CODE_BASE` (process-private).
pub const USER_DEVICE_BASE: u64 = 0x0000_0090_0000_0000;

/// Fixed user-space virtual base for `ALLOC_DMA` mappings.
pub const USER_DMA_BASE: u64 = 0x0000_00A0_0000_0000;

/// Maximum single DMA allocation, in pages.
pub const MAX_DMA_PAGES: usize = 256;

/// Maximum raw code size accepted by the MLK loader (spec §6): 1 MiB.
pub const MAX_CODE_SIZE: u32 = 1 << 20;

/// Upper bound on physical RAM this allocator's bitmap can cover: 512 MiB,
/// comfortably above QEMU `virt -m` defaults. `mm::frame_allocator::init`
/// clamps the reported RAM size down to this if it is ever larger.
pub const MAX_RAM_BYTES: u64 = 512 * 1024 * 1024;

/// `MAX_RAM_BYTES / PAGE_SIZE`, the number of frames the bitmap tracks.
pub const MAX_FRAMES: usize = (MAX_RAM_BYTES as usize) / PAGE_SIZE;

/// `MAX_FRAMES / 64`, the number of `u64` words in the frame bitmap.
pub const FRAME_BITMAP_WORDS: usize = MAX_FRAMES / 64;
