//! Syscall dispatch: the numbering/error enums from spec §6, and the
//! trap-frame-reading dispatcher that routes each `svc #0` to one of the
//! per-group handler modules below. Grounded on the teacher's
//! `syscall::{Syscall, SyscallError, syscall_handler/handle_syscall}` shape,
//! narrowed from the teacher's six-argument, capability-aware dispatch to
//! this kernel's fixed `x0..x3` args / `x8` number / `x0..x2` return
//! convention (spec §4.6).

mod console;
mod debug;
mod ipc;
mod memory;
mod process;

use crate::arch::aarch64::context::ExceptionFrame;

/// Syscall numbers, authoritative per spec §4.6.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Exit = 0,
    Yield = 1,
    GetPid = 2,
    GetTid = 3,
    Spawn = 4,
    Wait = 5,
    GetPpid = 6,
    Send = 10,
    Recv = 11,
    Call = 12,
    Reply = 13,
    PortCreate = 20,
    PortDestroy = 21,
    MapDevice = 32,
    AllocDma = 33,
    GetPhys = 34,
    Write = 40,
    Read = 41,
    DebugPrint = 100,
    GetTicks = 101,
}

impl Syscall {
    fn from_number(n: u64) -> Option<Self> {
        Some(match n {
            0 => Self::Exit,
            1 => Self::Yield,
            2 => Self::GetPid,
            3 => Self::GetTid,
            4 => Self::Spawn,
            5 => Self::Wait,
            6 => Self::GetPpid,
            10 => Self::Send,
            11 => Self::Recv,
            12 => Self::Call,
            13 => Self::Reply,
            20 => Self::PortCreate,
            21 => Self::PortDestroy,
            32 => Self::MapDevice,
            33 => Self::AllocDma,
            34 => Self::GetPhys,
            40 => Self::Write,
            41 => Self::Read,
            100 => Self::DebugPrint,
            101 => Self::GetTicks,
            _ => return None,
        })
    }
}

/// ABI-level error enumeration (spec §6). Negative of the magnitude named
/// in the spec; `as i64` gives the exact wire value.
#[repr(i64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    InvalidSyscall = -1,
    InvalidArgument = -2,
    NoPermission = -3,
    NoMemory = -4,
    WouldBlock = -5,
    Interrupted = -6,
    NotFound = -7,
    AlreadyExists = -8,
    InvalidPort = -9,
    QueueFull = -10,
    QueueEmpty = -11,
    NoChildren = -12,
    ChildRunning = -13,
}

/// Translate an internal [`crate::error::KernelError`] to the nearest ABI
/// error at the syscall-handler seam (spec §12's ambient-stack note: errors
/// never cross the boundary raw).
impl From<crate::error::KernelError> for SyscallError {
    fn from(e: crate::error::KernelError) -> Self {
        use crate::error::KernelError as E;
        match e {
            E::OutOfMemory { .. } => Self::NoMemory,
            E::InvalidAddress { .. } | E::UnmappedMemory { .. } => Self::InvalidArgument,
            E::ProcessNotFound { .. } | E::ThreadNotFound { .. } => Self::NotFound,
            E::InvalidState { .. } => Self::InvalidArgument,
            E::InvalidEndpoint { .. } => Self::InvalidPort,
            E::QueueFull => Self::QueueFull,
            E::TableFull { .. } => Self::NoMemory,
            E::InvalidArgument { .. } => Self::InvalidArgument,
            E::PermissionDenied { .. } => Self::NoPermission,
            E::NoChildren => Self::NoChildren,
            E::NotInitialized { .. } => Self::InvalidArgument,
        }
    }
}

/// Result type every per-syscall handler returns. `Ok(Blocking)` is spec
/// §6's "distinguished blocked sentinel" — the dispatcher leaves `x0`
/// untouched so a later unblock (IPC direct-handoff, `wait`'s unblock, or a
/// reply) can write the real return value into this thread's saved frame
/// itself (spec's "Blocked-syscall return value").
pub enum SyscallOutcome {
    /// Write `x0` (and, for `Recv`, `x1`/`x2`) now.
    Value([u64; 3]),
    /// Leave the frame untouched; the thread is already blocked.
    Blocking,
}

pub(crate) type SyscallResult = Result<SyscallOutcome, SyscallError>;

fn value(v: u64) -> SyscallResult {
    Ok(SyscallOutcome::Value([v, 0, 0]))
}

fn triple(v0: u64, v1: u64, v2: u64) -> SyscallResult {
    Ok(SyscallOutcome::Value([v0, v1, v2]))
}

/// Read `x8`/`x0..x3` from the trapped user frame, dispatch, and write the
/// result back into `x0..x2` — unless the handler blocked the caller, in
/// which case the frame is left exactly as the vector stub saved it (spec
/// §6's "Syscall dispatcher").
pub fn dispatch(frame: &mut ExceptionFrame) {
    let number = frame.x[8];
    let args = [frame.x[0], frame.x[1], frame.x[2], frame.x[3]];

    let result = match Syscall::from_number(number) {
        Some(syscall) => handle(syscall, args),
        None => Err(SyscallError::InvalidSyscall),
    };

    match result {
        Ok(SyscallOutcome::Value(v)) => {
            frame.x[0] = v[0];
            frame.x[1] = v[1];
            frame.x[2] = v[2];
        }
        Ok(SyscallOutcome::Blocking) => {}
        Err(e) => frame.x[0] = e as i64 as u64,
    }
}

fn handle(syscall: Syscall, args: [u64; 4]) -> SyscallResult {
    match syscall {
        Syscall::Exit => process::sys_exit(args[0] as i32),
        Syscall::Yield => process::sys_yield(),
        Syscall::GetPid => process::sys_getpid(),
        Syscall::GetTid => process::sys_gettid(),
        Syscall::Spawn => process::sys_spawn(args[0]),
        Syscall::Wait => process::sys_wait(args[0] as i64),
        Syscall::GetPpid => process::sys_getppid(),

        Syscall::Send => ipc::sys_send(args[0], args[1], args[2], args[3]),
        Syscall::Recv => ipc::sys_recv(args[0]),
        Syscall::Call => ipc::sys_call(args[0], args[1], args[2], args[3]),
        Syscall::Reply => ipc::sys_reply(args[0], args[1], args[2], args[3]),
        Syscall::PortCreate => ipc::sys_port_create(),
        Syscall::PortDestroy => ipc::sys_port_destroy(args[0]),

        Syscall::MapDevice => memory::sys_map_device(args[0], args[1]),
        Syscall::AllocDma => memory::sys_alloc_dma(args[0]),
        Syscall::GetPhys => memory::sys_get_phys(args[0]),

        Syscall::Write => console::sys_write(args[0], args[1]),
        Syscall::Read => console::sys_read(args[0], args[1]),

        Syscall::DebugPrint => debug::sys_debug_print(args[0], args[1]),
        Syscall::GetTicks => debug::sys_get_ticks(),
    }
}
