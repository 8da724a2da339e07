//! Scheduler core — kernel state and round-robin dispatch decisions
//!
//! All kernel bookkeeping lives in one [`KernelState`] so that independent
//! kernel instances can coexist (one per test, one per core image). The
//! running process is always the head of the ready list; there is no
//! separate "current" field. Methods here mutate queues and report what the
//! caller should do next; the actual control transfer belongs to the
//! platform layer.

use crate::clock::{IRQ_LINES, TIME_SLICE};
use crate::event::{Event, MAX_EVENTS};
use crate::fault::Fault;
use crate::list::WaitList;
use crate::monitor::{Monitor, MAX_MONITORS};
use crate::process::{Pid, ProcTable};

/// Complete kernel state, guarded by one lock in [`crate::kernel::Kernel`].
pub(crate) struct KernelState {
    pub(crate) procs: ProcTable,
    /// FIFO of runnable processes; the head is the one executing.
    pub(crate) ready: WaitList,
    /// Processes blocked in `sleep`, aged once per tick.
    pub(crate) sleeping: WaitList,
    pub(crate) monitors: [Monitor; MAX_MONITORS],
    pub(crate) monitor_count: usize,
    pub(crate) events: [Event; MAX_EVENTS],
    pub(crate) event_count: usize,
    /// One FIFO of blocked processes per hardware interrupt line.
    pub(crate) irq: [WaitList; IRQ_LINES],
    /// Ticks left in the current time slice.
    pub(crate) slice: u32,
    /// Total ticks delivered since boot.
    pub(crate) ticks: u64,
    /// Total dispatches performed.
    pub(crate) switches: u64,
    /// First fault observed; sticky, replayed by every later operation.
    pub(crate) fault: Option<Fault>,
    /// Set once dispatch begins; process creation is init-time only.
    pub(crate) started: bool,
}

impl KernelState {
    pub(crate) const fn new() -> Self {
        Self {
            procs: ProcTable::new(),
            ready: WaitList::new(),
            sleeping: WaitList::new(),
            monitors: [const { Monitor::new() }; MAX_MONITORS],
            monitor_count: 0,
            events: [const { Event::new() }; MAX_EVENTS],
            event_count: 0,
            irq: [const { WaitList::new() }; IRQ_LINES],
            slice: TIME_SLICE,
            ticks: 0,
            switches: 0,
            fault: None,
            started: false,
        }
    }

    /// The process executing right now: the ready-list head.
    pub(crate) fn current(&self) -> Result<Pid, Fault> {
        self.ready
            .head()
            .ok_or(Fault::ProtocolViolation("no running process"))
    }

    /// Admit a new process at the ready-list tail (FIFO admission order).
    pub(crate) fn admit(&mut self) -> Result<Pid, Fault> {
        if self.started {
            return Err(Fault::ProtocolViolation("create_process after start"));
        }
        let pid = self.procs.admit()?;
        self.ready.push_back(&mut self.procs, pid);
        Ok(pid)
    }

    /// Move the ready head to the tail. Core of `yield` and of time-slice
    /// rotation; a no-op on an empty or single-entry list.
    pub(crate) fn rotate_ready(&mut self) {
        if let Some(head) = self.ready.pop_front(&mut self.procs) {
            self.ready.push_back(&mut self.procs, head);
        }
    }

    /// Retire the running process. It leaves the ready list for good.
    pub(crate) fn terminate_current(&mut self) -> Result<Pid, Fault> {
        let me = self.current()?;
        self.ready.pop_front(&mut self.procs);
        let slot = &mut self.procs[me];
        slot.terminated = true;
        if slot.depth > 0 {
            log::warn!(
                "process {} terminated while holding {} monitor(s)",
                me.index(),
                slot.depth
            );
        }
        Ok(me)
    }

    /// True if the process sits in the ready list.
    pub(crate) fn is_ready(&self, pid: Pid) -> bool {
        self.ready.contains(&self.procs, pid)
    }
}
