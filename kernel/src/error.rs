//! Internal kernel error types.
//!
//! [`KernelError`] is for `Result`s used *inside* the kernel (allocator,
//! address-space, scheduler, IPC internals) and is never itself returned
//! across the syscall ABI — the syscall layer (`crate::syscall::SyscallError`)
//! translates each variant to the nearest fixed negative-integer code at the
//! dispatch seam (spec §6, §7). Trimmed from the teacher's `error.rs` to the
//! categories this kernel's modules actually raise.

use core::fmt;

/// Result alias used throughout the non-syscall-facing kernel internals.
pub type KernelResult<T> = core::result::Result<T, KernelError>;

/// Main kernel error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "kernel errors must be handled, not silently discarded"]
pub enum KernelError {
    /// No physical frames remain to satisfy an allocation.
    OutOfMemory { requested: usize, available: usize },
    /// A virtual address does not resolve to any thread's requirements.
    InvalidAddress { addr: usize },
    /// A virtual address has no mapping in the current address space.
    UnmappedMemory { addr: usize },
    /// A process id does not name a live process.
    ProcessNotFound { pid: u64 },
    /// A thread id does not name a live thread.
    ThreadNotFound { tid: u64 },
    /// An operation was attempted from a state that forbids it.
    InvalidState { expected: &'static str, actual: &'static str },
    /// An IPC endpoint id is out of range, unallocated, or closed.
    InvalidEndpoint { id: u32 },
    /// An endpoint's sender queue is at capacity.
    QueueFull,
    /// A fixed-capacity table (process, thread, endpoint, table-page ledger)
    /// has no free slot.
    TableFull { table: &'static str },
    /// An argument failed validation (range, alignment, unknown id).
    InvalidArgument { name: &'static str },
    /// A physical range is not contained in the device allowlist.
    PermissionDenied { operation: &'static str },
    /// `wait` was called by a process with no children.
    NoChildren,
    /// A subsystem was used before its `init()` ran.
    NotInitialized { subsystem: &'static str },
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfMemory { requested, available } => {
                write!(f, "out of memory: requested {requested} frames, {available} available")
            }
            KernelError::InvalidAddress { addr } => write!(f, "invalid address {addr:#x}"),
            KernelError::UnmappedMemory { addr } => write!(f, "unmapped address {addr:#x}"),
            KernelError::ProcessNotFound { pid } => write!(f, "no such process {pid}"),
            KernelError::ThreadNotFound { tid } => write!(f, "no such thread {tid}"),
            KernelError::InvalidState { expected, actual } => {
                write!(f, "invalid state: expected {expected}, got {actual}")
            }
            KernelError::InvalidEndpoint { id } => write!(f, "invalid endpoint {id}"),
            KernelError::QueueFull => write!(f, "sender queue full"),
            KernelError::TableFull { table } => write!(f, "{table} table full"),
            KernelError::InvalidArgument { name } => write!(f, "invalid argument: {name}"),
            KernelError::PermissionDenied { operation } => {
                write!(f, "permission denied: {operation}")
            }
            KernelError::NoChildren => write!(f, "no children"),
            KernelError::NotInitialized { subsystem } => {
                write!(f, "{subsystem} not initialized")
            }
        }
    }
}

/// Print a structured diagnostic banner and halt, per spec §7's fatal
/// boundary: any fault taken from privileged mode, corruption of the
/// vector-table patching, or a boot-critical allocation failure is fatal.
pub fn fatal(exception_class: &str, fault_addr: usize, pc: usize) -> ! {
    crate::arch::aarch64::exceptions::disable_irqs();
    log::error!(
        "*** KERNEL PANIC ***\n  class: {exception_class}\n  far:   {fault_addr:#018x}\n  elr:   {pc:#018x}"
    );
    crate::arch::aarch64::halt_forever();
}
