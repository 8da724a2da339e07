//! Clock integration — ticks, sleep, time slicing, interrupt waits
//!
//! One privileged tick source drives all timekeeping. Each tick: the time
//! slice counter is aged (rotating the ready list when it runs out), the
//! sleeping list is aged, and every monitor's timed-wait list is aged. A
//! sleeper whose counter reaches zero rejoins the ready tail; an expired
//! timed waiter is marked timed-out and either queues for the monitor
//! (still owned) or takes ownership on the spot (free).
//!
//! In the hosted build the embedder's driver loop is the clock process: it
//! delivers a tick whenever the ready list drains. An embedded port calls
//! `clock_tick` from its timer interrupt instead.

use crate::fault::Fault;
use crate::list::WaitList;
use crate::process::MAX_PROCESSES;
use crate::sched::KernelState;

/// Ticks per time slice before the ready list is rotated.
pub const TIME_SLICE: u32 = 10;

/// Number of hardware interrupt lines a process can block on.
pub const IRQ_LINES: usize = 8;

impl KernelState {
    /// Park the running process on the sleeping list for `ticks` ticks.
    /// It returns to ready after, not before, the tick that exhausts the
    /// counter; zero behaves like one.
    pub(crate) fn sleep_current(&mut self, ticks: u32) -> Result<(), Fault> {
        let me = self.current()?;
        self.ready.pop_front(&mut self.procs);
        self.procs[me].ticks = ticks;
        self.sleeping.push_back(&mut self.procs, me);
        Ok(())
    }

    /// Park the running process on a hardware interrupt line.
    pub(crate) fn begin_wait_interrupt(&mut self, line: usize) -> Result<(), Fault> {
        if line >= IRQ_LINES {
            return Err(Fault::InvalidHandle("interrupt line out of range"));
        }
        let me = self.current()?;
        self.ready.pop_front(&mut self.procs);
        self.irq[line].push_back(&mut self.procs, me);
        Ok(())
    }

    /// The interrupt line fired: re-admit its waiters at the ready-list
    /// FRONT, FIFO order preserved. Returns how many woke.
    pub(crate) fn raise_interrupt_line(&mut self, line: usize) -> Result<usize, Fault> {
        if line >= IRQ_LINES {
            return Err(Fault::InvalidHandle("interrupt line out of range"));
        }
        let mut drained = self.irq[line].take();
        let mut woken = [None; MAX_PROCESSES];
        let mut n = 0;
        while let Some(p) = drained.pop_front(&mut self.procs) {
            woken[n] = Some(p);
            n += 1;
        }
        for slot in woken[..n].iter().rev() {
            if let Some(p) = *slot {
                self.ready.push_front(&mut self.procs, p);
            }
        }
        Ok(n)
    }

    /// One timer tick: age the slice counter, the sleeping list, and every
    /// monitor's timed-wait list.
    pub(crate) fn clock_tick(&mut self) {
        self.ticks += 1;

        self.slice -= 1;
        if self.slice == 0 {
            self.slice = TIME_SLICE;
            self.rotate_ready();
        }

        // sleepers
        let mut pending = self.sleeping.take();
        let mut keep = WaitList::new();
        while let Some(p) = pending.pop_front(&mut self.procs) {
            let left = self.procs[p].ticks;
            if left <= 1 {
                self.procs[p].ticks = 0;
                self.ready.push_back(&mut self.procs, p);
            } else {
                self.procs[p].ticks = left - 1;
                keep.push_back(&mut self.procs, p);
            }
        }
        self.sleeping = keep;

        // timed waiters, per monitor
        for i in 0..self.monitor_count {
            let mut pending = self.monitors[i].timed.take();
            let mut keep = WaitList::new();
            while let Some(p) = pending.pop_front(&mut self.procs) {
                let left = self.procs[p].ticks;
                if left <= 1 {
                    self.procs[p].ticks = 0;
                    self.procs[p].timed_out = true;
                    if self.monitors[i].count > 0 {
                        // owned elsewhere: queue for normal acquisition
                        self.monitors[i].entry.push_back(&mut self.procs, p);
                    } else {
                        // free: the expirant takes ownership immediately
                        let m = &mut self.monitors[i];
                        m.count = 1;
                        m.owner = Some(p);
                        self.ready.push_back(&mut self.procs, p);
                    }
                } else {
                    self.procs[p].ticks = left - 1;
                    keep.push_back(&mut self.procs, p);
                }
            }
            self.monitors[i].timed = keep;
        }
    }

    #[cfg(any(test, feature = "std"))]
    pub(crate) fn has_sleepers(&self) -> bool {
        !self.sleeping.is_empty()
    }

    #[cfg(any(test, feature = "std"))]
    pub(crate) fn has_timed_waiters(&self) -> bool {
        self.monitors[..self.monitor_count]
            .iter()
            .any(|m| !m.timed.is_empty())
    }
}
