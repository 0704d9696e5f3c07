//! Fixed-capacity process table, directly grounded on the teacher's
//! no-alloc `process::table::ProcessArray` fallback — this kernel carries
//! no heap allocator at all, so that fallback is the only variant kept.

use crate::config::MAX_PROCESSES;
use crate::error::{KernelError, KernelResult};

use super::{Process, ProcessId};

pub struct ProcessTable {
    processes: [Option<Process>; MAX_PROCESSES],
    count: usize,
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            processes: [const { None }; MAX_PROCESSES],
            count: 0,
        }
    }

    pub fn insert(&mut self, process: Process) -> KernelResult<()> {
        if self.count >= MAX_PROCESSES {
            return Err(KernelError::TableFull { table: "process" });
        }
        for slot in &mut self.processes {
            if slot.is_none() {
                *slot = Some(process);
                self.count += 1;
                return Ok(());
            }
        }
        Err(KernelError::TableFull { table: "process" })
    }

    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.iter().flatten().find(|p| p.pid == pid)
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.processes.iter_mut().flatten().find(|p| p.pid == pid)
    }

    pub fn remove(&mut self, pid: ProcessId) -> Option<Process> {
        for slot in &mut self.processes {
            if slot.as_ref().map(|p| p.pid) == Some(pid) {
                self.count -= 1;
                return slot.take();
            }
        }
        None
    }

    pub fn for_each(&self, mut f: impl FnMut(&Process)) {
        for slot in self.processes.iter().flatten() {
            f(slot);
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
