//! Fixed-capacity endpoint table, following the same indexed-by-id fixed
//! array pattern as `sched::ThreadTable`/`process::ProcessTable` — this
//! kernel carries no heap allocator, so ids 2..MAX_ENDPOINTS map directly
//! onto array slots (0 and 1 are reserved and never allocated).

use crate::config::MAX_ENDPOINTS;
use crate::error::{KernelError, KernelResult};
use crate::sched::ThreadId;

use super::{Endpoint, EndpointId, EndpointState};

pub struct EndpointTable {
    endpoints: [Endpoint; MAX_ENDPOINTS],
}

impl EndpointTable {
    pub fn new() -> Self {
        Self {
            endpoints: [const { Endpoint::free() }; MAX_ENDPOINTS],
        }
    }

    fn slot(id: EndpointId) -> Option<usize> {
        let idx = id.0 as usize;
        if idx < 2 || idx >= MAX_ENDPOINTS {
            None
        } else {
            Some(idx)
        }
    }

    /// Allocate the first free slot (ids 2.. are eligible) for `owner`.
    pub fn allocate(&mut self, owner: ThreadId) -> KernelResult<EndpointId> {
        for (idx, slot) in self.endpoints.iter_mut().enumerate().skip(2) {
            if slot.state == EndpointState::Free {
                slot.state = EndpointState::Active;
                slot.owner = Some(owner);
                slot.senders = super::SenderQueue::new();
                slot.waiting_receiver = None;
                slot.notification_badge = None;
                return Ok(EndpointId(idx as u32));
            }
        }
        Err(KernelError::TableFull { table: "endpoint" })
    }

    /// Close an endpoint. Only its owner may destroy it, and only while no
    /// thread is blocked on it (queued as a sender or parked as the waiting
    /// receiver) — freeing the slot out from under a blocked thread would
    /// leave it parked forever, since nothing else would ever wake it.
    pub fn destroy(&mut self, id: EndpointId, requester: ThreadId) -> KernelResult<()> {
        let idx = Self::slot(id).ok_or(KernelError::InvalidEndpoint { id: id.0 })?;
        let endpoint = &mut self.endpoints[idx];
        if endpoint.state != EndpointState::Active {
            return Err(KernelError::InvalidEndpoint { id: id.0 });
        }
        if endpoint.owner != Some(requester) {
            return Err(KernelError::PermissionDenied { operation: "port_destroy" });
        }
        if !endpoint.senders.is_empty() || endpoint.waiting_receiver.is_some() {
            return Err(KernelError::InvalidState {
                expected: "no blocked senders or receiver",
                actual: "waiters queued",
            });
        }
        endpoint.state = EndpointState::Free;
        endpoint.owner = None;
        Ok(())
    }

    pub fn get_mut(&mut self, id: EndpointId) -> Option<&mut Endpoint> {
        let idx = Self::slot(id)?;
        Some(&mut self.endpoints[idx])
    }
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::new()
    }
}
