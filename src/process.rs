//! Process table — static pool of process descriptors
//!
//! Processes are created once at boot and live forever. Each descriptor
//! carries the link used by whichever queue currently holds it, the LIFO
//! stack of monitors the process has entered, and the tick counter used
//! while it sleeps or sits in a timed wait. The execution context itself
//! (registers, stack) belongs to the platform, not to this table.

use core::ops::{Index, IndexMut};

use crate::fault::Fault;
use crate::monitor::MonitorId;

/// Maximum processes the kernel can manage.
pub const MAX_PROCESSES: usize = 16;

/// Maximum nesting depth of monitor calls per process.
pub const MAX_NESTED: usize = 16;

/// Handle to a process slot.
///
/// Valid handles are only ever produced by [`ProcTable::admit`], so holding
/// one implies the slot is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pid(pub(crate) usize);

impl Pid {
    /// Slot index in the process table.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One process descriptor.
#[derive(Clone, Copy)]
pub(crate) struct ProcessSlot {
    /// Link to the next process in whichever list currently holds this one.
    pub(crate) next: Option<Pid>,
    /// True while the process is a member of some list. A process is in
    /// exactly one list at a time; this bit backs the debug assertions.
    pub(crate) in_list: bool,
    /// LIFO stack of monitors entered without a matching exit.
    pub(crate) mstack: [Option<MonitorId>; MAX_NESTED],
    /// Current nesting depth (top of `mstack`).
    pub(crate) depth: usize,
    /// Remaining ticks while sleeping or in a timed wait.
    pub(crate) ticks: u32,
    /// Set by the clock when a timed wait expires before a notify.
    pub(crate) timed_out: bool,
    /// Set when the process body has returned; never scheduled again.
    pub(crate) terminated: bool,
}

impl ProcessSlot {
    pub(crate) const fn empty() -> Self {
        Self {
            next: None,
            in_list: false,
            mstack: [None; MAX_NESTED],
            depth: 0,
            ticks: 0,
            timed_out: false,
            terminated: false,
        }
    }
}

/// Fixed-size process table.
pub(crate) struct ProcTable {
    slots: [ProcessSlot; MAX_PROCESSES],
    count: usize,
}

impl ProcTable {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [ProcessSlot::empty(); MAX_PROCESSES],
            count: 0,
        }
    }

    /// Claim the next free slot.
    pub(crate) fn admit(&mut self) -> Result<Pid, Fault> {
        if self.count == MAX_PROCESSES {
            return Err(Fault::ResourceExhausted("process table full"));
        }
        let pid = Pid(self.count);
        self.slots[pid.0] = ProcessSlot::empty();
        self.count += 1;
        Ok(pid)
    }

    /// Number of admitted processes.
    #[cfg(any(test, feature = "std"))]
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    /// Push a monitor id onto the process's call stack.
    pub(crate) fn push_monitor(&mut self, pid: Pid, id: MonitorId) -> Result<(), Fault> {
        let slot = &mut self.slots[pid.0];
        if slot.depth == MAX_NESTED {
            return Err(Fault::ResourceExhausted("monitor call stack overflow"));
        }
        slot.mstack[slot.depth] = Some(id);
        slot.depth += 1;
        Ok(())
    }

    /// Pop the most recently entered monitor, if any.
    pub(crate) fn pop_monitor(&mut self, pid: Pid) -> Option<MonitorId> {
        let slot = &mut self.slots[pid.0];
        if slot.depth == 0 {
            return None;
        }
        slot.depth -= 1;
        slot.mstack[slot.depth].take()
    }

    /// The monitor the process is currently innermost in, if any.
    pub(crate) fn peek_monitor(&self, pid: Pid) -> Option<MonitorId> {
        let slot = &self.slots[pid.0];
        if slot.depth == 0 {
            return None;
        }
        slot.mstack[slot.depth - 1]
    }
}

impl Index<Pid> for ProcTable {
    type Output = ProcessSlot;

    fn index(&self, pid: Pid) -> &ProcessSlot {
        &self.slots[pid.0]
    }
}

impl IndexMut<Pid> for ProcTable {
    fn index_mut(&mut self, pid: Pid) -> &mut ProcessSlot {
        &mut self.slots[pid.0]
    }
}
