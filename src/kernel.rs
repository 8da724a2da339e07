//! Kernel — the public face of the micro-kernel
//!
//! A [`Kernel`] owns the complete scheduler state behind one lock and a
//! [`Platform`] that performs the actual context switches. Holding the lock
//! is the kernel's interrupt-mask bracket: every queue mutation happens
//! inside it, and it is never held across a transfer.
//!
//! Error policy is halt-on-fault: the first [`Fault`] latches, is logged,
//! and every later operation returns it unchanged. Blocked processes stay
//! blocked; the idle context is woken so a hosted driver can observe the
//! fault and stop.

use spin::Mutex;

use crate::context::{Platform, Resume};
use crate::event::EventId;
use crate::fault::Fault;
use crate::monitor::{Entered, MonitorId};
use crate::process::Pid;
use crate::sched::KernelState;

/// A complete micro-kernel instance.
///
/// Independent instances are fully isolated; tests create one per scenario.
pub struct Kernel<P: Platform> {
    pub(crate) state: Mutex<KernelState>,
    pub(crate) platform: P,
}

impl<P: Platform> Kernel<P> {
    /// Create an empty kernel on the given platform.
    pub const fn new(platform: P) -> Self {
        Self {
            state: Mutex::new(KernelState::new()),
            platform,
        }
    }

    /// Run a state mutation inside the interrupt-mask bracket, latching
    /// any fault it reports. A latched fault is sticky: it short-circuits
    /// every subsequent operation.
    fn guard<R>(&self, op: impl FnOnce(&mut KernelState) -> Result<R, Fault>) -> Result<R, Fault> {
        let outcome = {
            let mut st = self.state.lock();
            if let Some(fault) = st.fault {
                return Err(fault);
            }
            match op(&mut st) {
                Ok(v) => Ok(v),
                Err(fault) => {
                    st.fault = Some(fault);
                    Err(fault)
                }
            }
        };
        if let Err(fault) = outcome {
            log::error!("kernel halted: {fault}");
            // wake the idle context so a driver loop can observe the fault
            self.platform.resume(Resume::Idle);
        }
        outcome
    }

    /// Latch a fault reported outside the bracket (platform failures).
    fn latch(&self, fault: Fault) {
        {
            let mut st = self.state.lock();
            if st.fault.is_none() {
                st.fault = Some(fault);
            }
        }
        log::error!("kernel halted: {fault}");
        self.platform.resume(Resume::Idle);
    }

    /// Transfer to the ready-list head, or to idle when the list is empty.
    /// The caller must not hold the state lock.
    fn dispatch(&self) {
        let target = {
            let mut st = self.state.lock();
            st.switches += 1;
            match st.ready.head() {
                Some(pid) => Resume::Process(pid),
                None => Resume::Idle,
            }
        };
        self.platform.transfer(target);
    }

    /// Register a schedulable process. Init-time only, before dispatch
    /// begins; the process joins the ready-list tail.
    pub fn create_process(&self, entry: P::Entry, stack_size: usize) -> Result<Pid, Fault> {
        let pid = self.guard(|st| st.admit())?;
        if let Err(fault) = self.platform.create_context(pid, entry, stack_size) {
            self.latch(fault);
            return Err(fault);
        }
        log::debug!("process {} created", pid.index());
        Ok(pid)
    }

    /// Rotate the ready list and hand the processor to the new head.
    pub fn yield_now(&self) -> Result<(), Fault> {
        self.guard(|st| {
            st.rotate_ready();
            Ok(())
        })?;
        self.dispatch();
        Ok(())
    }

    /// Retire the calling process and hand the processor on without ever
    /// resuming the caller.
    pub fn exit_current(&self) {
        if self.guard(|st| st.terminate_current()).is_err() {
            // halted; idle was already woken
            return;
        }
        let target = {
            let mut st = self.state.lock();
            st.switches += 1;
            match st.ready.head() {
                Some(pid) => Resume::Process(pid),
                None => Resume::Idle,
            }
        };
        self.platform.resume(target);
    }

    pub fn create_monitor(&self) -> Result<MonitorId, Fault> {
        let id = self.guard(|st| st.create_monitor())?;
        log::debug!("monitor {} created", id.index());
        Ok(id)
    }

    /// Enter (or re-enter) a monitor, blocking while another process owns
    /// it.
    pub fn enter_monitor(&self, id: MonitorId) -> Result<(), Fault> {
        match self.guard(|st| st.begin_enter(id))? {
            Entered::Immediate => Ok(()),
            Entered::Blocked(me) => {
                self.dispatch();
                self.guard(move |st| st.finish_enter(me, id))
            }
        }
    }

    /// Leave the innermost monitor, releasing ownership at depth zero.
    pub fn exit_monitor(&self) -> Result<(), Fault> {
        self.guard(|st| st.exit_monitor())
    }

    /// Release the owned monitor and block until notified and re-granted
    /// ownership.
    pub fn wait(&self) -> Result<(), Fault> {
        let (me, id, saved) = self.guard(|st| st.begin_wait())?;
        self.dispatch();
        self.guard(move |st| st.finish_wait(me, id, saved))
    }

    /// As [`wait`](Self::wait), with a deadline in ticks. Returns `true`
    /// iff a notify arrived strictly before the deadline.
    pub fn timed_wait(&self, ticks: u32) -> Result<bool, Fault> {
        let (me, id, saved) = self.guard(|st| st.begin_timed_wait(ticks))?;
        self.dispatch();
        self.guard(move |st| st.finish_timed_wait(me, id, saved))
    }

    /// Move one blocked process to the entry queue (Mesa semantics: it
    /// re-acquires and re-checks its condition later).
    pub fn notify(&self) -> Result<(), Fault> {
        self.guard(|st| st.notify())
    }

    /// Move every blocked process to the entry queue.
    pub fn notify_all(&self) -> Result<(), Fault> {
        self.guard(|st| st.notify_all())
    }

    pub fn create_event(&self) -> Result<EventId, Fault> {
        let id = self.guard(|st| st.create_event())?;
        log::debug!("event {} created", id.index());
        Ok(id)
    }

    /// Wait for an event: returns at once if it already happened, blocks
    /// until triggered otherwise.
    pub fn attendre(&self, id: EventId) -> Result<(), Fault> {
        if self.guard(|st| st.begin_attendre(id))? {
            self.dispatch();
        }
        Ok(())
    }

    /// Trigger an event: set its flag and release every waiter.
    pub fn declencher(&self, id: EventId) -> Result<(), Fault> {
        self.guard(|st| st.declencher(id))
    }

    /// Reset an event's flag.
    pub fn reinitialiser(&self, id: EventId) -> Result<(), Fault> {
        self.guard(|st| st.reinitialiser(id))
    }

    /// Block the calling process for `ticks` clock ticks.
    pub fn sleep(&self, ticks: u32) -> Result<(), Fault> {
        self.guard(|st| st.sleep_current(ticks))?;
        self.dispatch();
        Ok(())
    }

    /// Block the calling process until the given interrupt line fires.
    pub fn wait_interrupt(&self, line: usize) -> Result<(), Fault> {
        self.guard(|st| st.begin_wait_interrupt(line))?;
        self.dispatch();
        Ok(())
    }

    /// The given interrupt line fired: waiters rejoin the ready-list
    /// front. Called by the embedder or an interrupt trampoline, not by
    /// processes. Returns how many processes woke.
    pub fn raise_interrupt(&self, line: usize) -> Result<usize, Fault> {
        self.guard(|st| st.raise_interrupt_line(line))
    }

    /// Deliver one clock tick. On the hosted platform the driver loop
    /// calls this; an embedded port calls it from the timer interrupt.
    pub fn tick(&self) {
        let mut st = self.state.lock();
        if st.fault.is_none() {
            st.clock_tick();
        }
    }

    /// The latched fault, if the kernel has halted.
    pub fn fault(&self) -> Option<Fault> {
        self.state.lock().fault
    }

    /// Whether the process currently sits in the ready list.
    pub fn is_ready(&self, pid: Pid) -> bool {
        self.state.lock().is_ready(pid)
    }

    /// Total ticks delivered since boot.
    pub fn ticks(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Snapshot of the counters a run reports.
    #[cfg(any(test, feature = "std"))]
    pub(crate) fn stats(&self, ticks: u64) -> RunStats {
        let st = self.state.lock();
        RunStats {
            ticks,
            switches: st.switches,
            processes: st.procs.count(),
            fault: st.fault,
        }
    }
}

/// Counters reported by a hosted run.
#[derive(Debug, Clone)]
pub struct RunStats {
    /// Ticks delivered during this run.
    pub ticks: u64,
    /// Total dispatches since boot.
    pub switches: u64,
    /// Processes created.
    pub processes: usize,
    /// Fault that halted the kernel, if any.
    pub fault: Option<Fault>,
}
