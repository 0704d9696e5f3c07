//! IPC syscalls: `SEND`, `RECV`, `CALL`, `REPLY`, `PORT_CREATE`,
//! `PORT_DESTROY` (spec §4.5, §4.6). Each one is a thin translation from
//! the fixed `x0..x3` argument convention onto `ipc::Message` and back;
//! the actual rendezvous logic lives entirely in `crate::ipc`.

use super::{triple, value, SyscallError, SyscallResult, SyscallOutcome};
use crate::ipc::{self, EndpointId, Message, RecvOutcome, SendOutcome};

fn endpoint(raw: u64) -> Result<EndpointId, SyscallError> {
    let id = EndpointId(raw as u32);
    if id == EndpointId::INVALID {
        return Err(SyscallError::InvalidPort);
    }
    Ok(id)
}

/// `SEND(endpoint, op, arg0, arg1)`.
pub fn sys_send(ep: u64, op: u64, arg0: u64, arg1: u64) -> SyscallResult {
    let id = endpoint(ep)?;
    let msg = Message { op: op as u32, args: [arg0, arg1, 0, 0], ..Message::default() };
    match ipc::send(id, msg)? {
        SendOutcome::Delivered => value(0),
        SendOutcome::Blocked => Ok(SyscallOutcome::Blocking),
    }
}

/// `RECV(endpoint)`: on immediate delivery, `x0=op, x1=args[0], x2=args[1]`
/// (spec's worked example S2); notifications pack `x0=u32::MAX, x1=badge`
/// (this kernel's own convention — spec's syscall surface names no distinct
/// `NOTIFY` syscall, so a notified receiver is distinguished from a normal
/// message only by this sentinel op value).
pub fn sys_recv(ep: u64) -> SyscallResult {
    let id = endpoint(ep)?;
    match ipc::receive(id)? {
        RecvOutcome::Message(msg) => triple(msg.op as u64, msg.args[0], msg.args[1]),
        RecvOutcome::Notification { badge } => triple(u32::MAX as u64, badge, 0),
        RecvOutcome::Blocked => Ok(SyscallOutcome::Blocking),
    }
}

/// `CALL(endpoint, op, arg0, arg1)`: always blocks until a matching
/// `REPLY` (spec's "Call").
pub fn sys_call(ep: u64, op: u64, arg0: u64, arg1: u64) -> SyscallResult {
    let id = endpoint(ep)?;
    let msg = Message { op: op as u32, args: [arg0, arg1, 0, 0], ..Message::default() };
    ipc::call(id, msg)?;
    Ok(SyscallOutcome::Blocking)
}

/// `REPLY(target_tid, op, arg0, arg1)`: delivers directly to the thread id
/// a prior `RECV`/`CALL` reported as `sender` (spec's "Reply").
pub fn sys_reply(target_tid: u64, op: u64, arg0: u64, arg1: u64) -> SyscallResult {
    let target = crate::sched::ThreadId(target_tid);
    let msg = Message { op: op as u32, args: [arg0, arg1, 0, 0], ..Message::default() };
    ipc::reply(target, msg)?;
    value(0)
}

pub fn sys_port_create() -> SyscallResult {
    let owner = crate::sched::current();
    let id = ipc::port_create(owner)?;
    value(id.0 as u64)
}

pub fn sys_port_destroy(ep: u64) -> SyscallResult {
    let id = endpoint(ep)?;
    let requester = crate::sched::current();
    ipc::port_destroy(id, requester)?;
    value(0)
}
