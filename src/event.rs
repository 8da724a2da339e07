//! Events — binary, level-triggered broadcast latches
//!
//! The older, simpler signaling primitive, kept alongside monitors. An
//! event is a boolean flag plus a waiting queue: `attendre` returns at once
//! while the flag is set and blocks otherwise; `declencher` sets the flag
//! and releases every waiter; `reinitialiser` clears it. No ownership, no
//! mutual exclusion; two events paired (empty/full) make a single-slot
//! handoff without a monitor.

use crate::fault::Fault;
use crate::list::WaitList;
use crate::sched::KernelState;

/// Maximum events the kernel can manage.
pub const MAX_EVENTS: usize = 16;

/// Handle to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventId(pub(crate) usize);

impl EventId {
    /// Slot index in the event pool.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One event descriptor.
pub(crate) struct Event {
    /// Level-triggered flag; stays set until reset.
    pub(crate) happened: bool,
    pub(crate) waiting: WaitList,
}

impl Event {
    pub(crate) const fn new() -> Self {
        Self {
            happened: false,
            waiting: WaitList::new(),
        }
    }
}

impl KernelState {
    pub(crate) fn create_event(&mut self) -> Result<EventId, Fault> {
        if self.event_count == MAX_EVENTS {
            return Err(Fault::ResourceExhausted("event pool full"));
        }
        let id = EventId(self.event_count);
        self.event_count += 1;
        Ok(id)
    }

    fn check_event(&self, id: EventId) -> Result<(), Fault> {
        if id.0 >= self.event_count {
            return Err(Fault::InvalidHandle("event id out of range"));
        }
        Ok(())
    }

    /// First half of `attendre`. Returns `true` if the caller was parked
    /// on the event queue and a dispatch is needed.
    pub(crate) fn begin_attendre(&mut self, id: EventId) -> Result<bool, Fault> {
        self.check_event(id)?;
        let me = self.current()?;
        if self.events[id.0].happened {
            return Ok(false);
        }
        let head = self.ready.pop_front(&mut self.procs);
        debug_assert_eq!(head, Some(me));
        self.events[id.0].waiting.push_back(&mut self.procs, me);
        Ok(true)
    }

    /// Set the flag and broadcast: every waiter moves to the ready tail in
    /// FIFO order. The flag stays set for future `attendre` calls.
    pub(crate) fn declencher(&mut self, id: EventId) -> Result<(), Fault> {
        self.check_event(id)?;
        self.events[id.0].happened = true;
        while let Some(p) = self.events[id.0].waiting.pop_front(&mut self.procs) {
            self.ready.push_back(&mut self.procs, p);
        }
        Ok(())
    }

    /// Clear the flag. Processes already released stay released.
    pub(crate) fn reinitialiser(&mut self, id: EventId) -> Result<(), Fault> {
        self.check_event(id)?;
        self.events[id.0].happened = false;
        Ok(())
    }
}
