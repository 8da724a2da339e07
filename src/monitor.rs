//! Monitors — reentrant mutual exclusion with condition waiting
//!
//! A monitor is Free (count 0, no owner) or Owned (count >= 1). The owner
//! may re-enter without blocking; contenders queue FIFO in the entry list.
//! `wait` releases ownership and parks the caller in the waiting list;
//! `notify` moves one blocked process back to the entry list without
//! granting ownership (Mesa semantics: the woken process re-checks its
//! condition). Timed waiters sit in a third list aged by the clock.
//!
//! Blocking operations are split in two: a `begin_*` half that runs before
//! the control transfer and a `finish_*` half that runs after the caller is
//! resumed. The finish half verifies that the handoff left the caller as
//! sole owner; any other observation means kernel state is no longer
//! trustworthy and latches a fault.

use crate::fault::Fault;
use crate::list::WaitList;
use crate::process::Pid;
use crate::sched::KernelState;

/// Maximum monitors the kernel can manage.
pub const MAX_MONITORS: usize = 16;

/// Handle to a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorId(pub(crate) usize);

impl MonitorId {
    /// Slot index in the monitor pool.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One monitor descriptor.
pub(crate) struct Monitor {
    /// Reentrancy count; zero iff the monitor is free.
    pub(crate) count: u32,
    /// Owning process; set iff `count > 0`.
    pub(crate) owner: Option<Pid>,
    /// Processes blocked trying to acquire the monitor.
    pub(crate) entry: WaitList,
    /// Processes parked in `wait`, pending a notify.
    pub(crate) waiting: WaitList,
    /// Processes parked in `timed_wait`, aged by the clock.
    pub(crate) timed: WaitList,
}

impl Monitor {
    pub(crate) const fn new() -> Self {
        Self {
            count: 0,
            owner: None,
            entry: WaitList::new(),
            waiting: WaitList::new(),
            timed: WaitList::new(),
        }
    }
}

/// Outcome of the first half of `enter_monitor`.
#[derive(Debug)]
pub(crate) enum Entered {
    /// Ownership taken (or re-entered); no transfer needed.
    Immediate,
    /// Caller moved to the entry queue; dispatch, then finish the enter.
    Blocked(Pid),
}

impl KernelState {
    pub(crate) fn create_monitor(&mut self) -> Result<MonitorId, Fault> {
        if self.monitor_count == MAX_MONITORS {
            return Err(Fault::ResourceExhausted("monitor pool full"));
        }
        let id = MonitorId(self.monitor_count);
        self.monitor_count += 1;
        Ok(id)
    }

    fn check_monitor(&self, id: MonitorId) -> Result<(), Fault> {
        if id.0 >= self.monitor_count {
            return Err(Fault::InvalidHandle("monitor id out of range"));
        }
        Ok(())
    }

    /// First half of `enter_monitor`: take or re-enter the monitor, or
    /// queue behind the current owner.
    pub(crate) fn begin_enter(&mut self, id: MonitorId) -> Result<Entered, Fault> {
        self.check_monitor(id)?;
        let me = self.current()?;
        if self.procs[me].depth == crate::process::MAX_NESTED {
            // checked before blocking so a contender cannot fault after
            // it has already been queued
            return Err(Fault::ResourceExhausted("monitor call stack overflow"));
        }
        let (count, owner) = {
            let m = &self.monitors[id.0];
            (m.count, m.owner)
        };
        if count > 0 && owner != Some(me) {
            let head = self.ready.pop_front(&mut self.procs);
            debug_assert_eq!(head, Some(me));
            self.monitors[id.0].entry.push_back(&mut self.procs, me);
            Ok(Entered::Blocked(me))
        } else {
            let m = &mut self.monitors[id.0];
            m.count += 1;
            m.owner = Some(me);
            self.procs.push_monitor(me, id)?;
            Ok(Entered::Immediate)
        }
    }

    /// Second half of a contended `enter_monitor`, run after resumption.
    /// The exiting owner must have handed us the monitor with count 1.
    pub(crate) fn finish_enter(&mut self, me: Pid, id: MonitorId) -> Result<(), Fault> {
        let m = &self.monitors[id.0];
        if m.count != 1 || m.owner != Some(me) {
            return Err(Fault::ProtocolViolation(
                "monitor handoff left inconsistent state",
            ));
        }
        self.procs.push_monitor(me, id)
    }

    /// Pop the innermost monitor and release one level of reentrancy. At
    /// zero, ownership transfers to the entry head or the monitor frees.
    pub(crate) fn exit_monitor(&mut self) -> Result<(), Fault> {
        let me = self.current()?;
        let id = self
            .procs
            .pop_monitor(me)
            .ok_or(Fault::ProtocolViolation("exit_monitor outside of a monitor"))?;
        {
            let m = &mut self.monitors[id.0];
            if m.owner != Some(me) || m.count == 0 {
                return Err(Fault::ProtocolViolation("exit_monitor by non-owner"));
            }
            m.count -= 1;
            if m.count > 0 {
                return Ok(());
            }
        }
        self.grant_to_entry_head(id);
        Ok(())
    }

    /// Hand a released monitor to the entry head (who becomes ready) or
    /// mark it free.
    fn grant_to_entry_head(&mut self, id: MonitorId) {
        if let Some(next) = self.monitors[id.0].entry.pop_front(&mut self.procs) {
            self.ready.push_back(&mut self.procs, next);
            let m = &mut self.monitors[id.0];
            m.count = 1;
            m.owner = Some(next);
        } else {
            let m = &mut self.monitors[id.0];
            m.count = 0;
            m.owner = None;
        }
    }

    /// Shared begin half of `wait` and `timed_wait`: park the caller in the
    /// given queue and release ownership as `exit_monitor` would, without
    /// popping the call stack. Returns the saved reentrancy count.
    fn begin_park(
        &mut self,
        park_timed: bool,
        what: &'static str,
    ) -> Result<(Pid, MonitorId, u32), Fault> {
        let me = self.current()?;
        let id = self
            .procs
            .peek_monitor(me)
            .ok_or(Fault::ProtocolViolation(what))?;
        if self.monitors[id.0].owner != Some(me) {
            return Err(Fault::ProtocolViolation(what));
        }
        let saved = self.monitors[id.0].count;
        let head = self.ready.pop_front(&mut self.procs);
        debug_assert_eq!(head, Some(me));
        if park_timed {
            self.monitors[id.0].timed.push_back(&mut self.procs, me);
        } else {
            self.monitors[id.0].waiting.push_back(&mut self.procs, me);
        }
        self.grant_to_entry_head(id);
        Ok((me, id, saved))
    }

    /// Shared finish half: the caller must find itself restored as sole
    /// owner, then its saved reentrancy count comes back. Only the depth
    /// observed by this one call is restored; outer wait frames are not
    /// unwound. Known limitation of the contract.
    fn finish_park(&mut self, me: Pid, id: MonitorId, saved: u32) -> Result<(), Fault> {
        let m = &mut self.monitors[id.0];
        if m.count != 1 || m.owner != Some(me) {
            return Err(Fault::ProtocolViolation(
                "monitor handoff left inconsistent state",
            ));
        }
        m.count = saved;
        Ok(())
    }

    pub(crate) fn begin_wait(&mut self) -> Result<(Pid, MonitorId, u32), Fault> {
        self.begin_park(false, "wait outside of an owned monitor")
    }

    pub(crate) fn finish_wait(&mut self, me: Pid, id: MonitorId, saved: u32) -> Result<(), Fault> {
        self.finish_park(me, id, saved)
    }

    pub(crate) fn begin_timed_wait(&mut self, ticks: u32) -> Result<(Pid, MonitorId, u32), Fault> {
        let parked = self.begin_park(true, "timed_wait outside of an owned monitor")?;
        let (me, _, _) = parked;
        self.procs[me].ticks = ticks;
        self.procs[me].timed_out = false;
        Ok(parked)
    }

    /// Returns `true` iff a notify arrived strictly before the deadline.
    pub(crate) fn finish_timed_wait(
        &mut self,
        me: Pid,
        id: MonitorId,
        saved: u32,
    ) -> Result<bool, Fault> {
        self.finish_park(me, id, saved)?;
        Ok(!self.procs[me].timed_out)
    }

    /// Move one blocked process into the entry queue. Timed waiters are
    /// drained in preference to plain waiters.
    pub(crate) fn notify(&mut self) -> Result<(), Fault> {
        let id = self.notifier_monitor()?;
        self.notify_one(id);
        Ok(())
    }

    /// Move every blocked process into the entry queue, timed waiters
    /// first, FIFO within each queue.
    pub(crate) fn notify_all(&mut self) -> Result<(), Fault> {
        let id = self.notifier_monitor()?;
        while self.notify_one(id) {}
        Ok(())
    }

    fn notifier_monitor(&self) -> Result<MonitorId, Fault> {
        let me = self.current()?;
        let id = self
            .procs
            .peek_monitor(me)
            .ok_or(Fault::ProtocolViolation("notify outside of an owned monitor"))?;
        if self.monitors[id.0].owner != Some(me) {
            return Err(Fault::ProtocolViolation("notify outside of an owned monitor"));
        }
        Ok(id)
    }

    fn notify_one(&mut self, id: MonitorId) -> bool {
        if let Some(p) = self.monitors[id.0].timed.pop_front(&mut self.procs) {
            // deadline disarmed; the wait now ends by acquisition only
            self.procs[p].ticks = 0;
            self.monitors[id.0].entry.push_back(&mut self.procs, p);
            true
        } else if let Some(p) = self.monitors[id.0].waiting.pop_front(&mut self.procs) {
            self.monitors[id.0].entry.push_back(&mut self.procs, p);
            true
        } else {
            false
        }
    }
}
