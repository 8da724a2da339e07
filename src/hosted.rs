//! Hosted platform — green threads for simulation and testing
//!
//! Backs each process context with a parked OS thread. Exactly one context
//! is unparked at a time, so execution is logically single-threaded and
//! deterministic: a transfer wakes the target and parks the caller, a
//! strict baton pass. The thread that calls [`run`](Kernel::run) is both
//! the idle process and the privileged clock process: whenever the ready
//! list drains, control comes back to it and it delivers a tick.
//!
//! An embedded port would implement [`Platform`] over a register-frame
//! switch instead; nothing outside this module depends on `std`.

use std::boxed::Box;
use std::cell::RefCell;
use std::format;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, Thread};
use std::thread_local;
use std::vec::Vec;

use crate::context::{Platform, Resume};
use crate::fault::Fault;
use crate::kernel::{Kernel, RunStats};
use crate::process::Pid;

/// Entry point of a hosted process.
pub type Entry = Box<dyn FnOnce() + Send + 'static>;

/// A kernel running on green threads.
pub type HostedKernel = Kernel<HostedPlatform>;

/// Park/unpark baton for one context. The token survives an unpark that
/// lands before the owner parks, so wake-ups are never lost.
struct Parker {
    resume: AtomicBool,
    thread: StdMutex<Option<Thread>>,
}

impl Parker {
    fn new() -> Self {
        Self {
            resume: AtomicBool::new(false),
            thread: StdMutex::new(None),
        }
    }

    fn set_thread(&self, t: Thread) {
        if let Ok(mut slot) = self.thread.lock() {
            *slot = Some(t);
        }
    }

    fn unpark(&self) {
        self.resume.store(true, Ordering::Release);
        if let Ok(slot) = self.thread.lock() {
            if let Some(t) = slot.as_ref() {
                t.unpark();
            }
        }
    }

    fn park(&self) {
        while !self.resume.swap(false, Ordering::Acquire) {
            thread::park();
        }
    }
}

thread_local! {
    /// The parker owned by the context running on this thread.
    static CURRENT: RefCell<Option<Arc<Parker>>> = const { RefCell::new(None) };
}

/// Thread-backed context-switch platform.
pub struct HostedPlatform {
    /// One parker per process, indexed by pid.
    parkers: StdMutex<Vec<Arc<Parker>>>,
    /// Parker for the idle/driver context.
    idle: Arc<Parker>,
}

impl HostedPlatform {
    pub fn new() -> Self {
        Self {
            parkers: StdMutex::new(Vec::new()),
            idle: Arc::new(Parker::new()),
        }
    }

    fn parker_for(&self, target: Resume) -> Option<Arc<Parker>> {
        match target {
            Resume::Idle => Some(Arc::clone(&self.idle)),
            Resume::Process(pid) => self
                .parkers
                .lock()
                .ok()?
                .get(pid.index())
                .cloned(),
        }
    }

    /// Adopt the calling thread as the idle/driver context.
    fn register_driver(&self) {
        self.idle.set_thread(thread::current());
        let idle = Arc::clone(&self.idle);
        CURRENT.with(|c| *c.borrow_mut() = Some(idle));
    }
}

impl Default for HostedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HostedPlatform {
    type Entry = Box<dyn FnOnce() + Send + 'static>;

    fn create_context(&self, pid: Pid, entry: Entry, stack_size: usize) -> Result<(), Fault> {
        let parker = Arc::new(Parker::new());
        if let Ok(mut parkers) = self.parkers.lock() {
            debug_assert_eq!(parkers.len(), pid.index());
            parkers.push(Arc::clone(&parker));
        }

        let mine = Arc::clone(&parker);
        let mut builder = thread::Builder::new().name(format!("proc-{}", pid.index()));
        if stack_size > 0 {
            builder = builder.stack_size(stack_size);
        }
        let handle = builder
            .spawn(move || {
                let parker = Arc::clone(&mine);
                CURRENT.with(|c| *c.borrow_mut() = Some(mine));
                // stay suspended until first dispatched
                parker.park();
                entry();
            })
            .map_err(|_| Fault::ResourceExhausted("process stack allocation failed"))?;
        parker.set_thread(handle.thread().clone());
        Ok(())
    }

    fn transfer(&self, target: Resume) {
        let me = CURRENT.with(|c| c.borrow().clone());
        self.resume(target);
        if let Some(me) = me {
            me.park();
        }
    }

    fn resume(&self, target: Resume) {
        if let Some(parker) = self.parker_for(target) {
            parker.unpark();
        }
    }
}

impl Kernel<HostedPlatform> {
    /// A fresh hosted kernel, shared between the driver and its processes.
    pub fn hosted() -> Arc<Self> {
        Arc::new(Kernel::new(HostedPlatform::new()))
    }

    /// Register a process whose body is a closure. The body runs on its
    /// own green thread; when it returns (or panics) the process retires
    /// cleanly instead of wedging the dispatch chain.
    pub fn spawn(
        self: Arc<Self>,
        body: impl FnOnce() + Send + 'static,
        stack_size: usize,
    ) -> Result<Pid, Fault> {
        let kernel = Arc::clone(&self);
        self.create_process(
            Box::new(move || {
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(body));
                kernel.exit_current();
            }),
            stack_size,
        )
    }

    /// Start dispatch and drive the clock, in place of the `start()` that
    /// never returns on hardware. Runs processes whenever the ready list
    /// is non-empty and delivers a tick each time it drains; returns when
    /// the kernel halts, nothing is left that a tick could wake, or
    /// `max_ticks` ticks have been delivered.
    pub fn run(&self, max_ticks: u64) -> RunStats {
        self.platform.register_driver();
        {
            let mut st = self.state.lock();
            if !st.started {
                st.started = true;
                if st.ready.is_empty() && st.fault.is_none() {
                    st.fault = Some(Fault::ProtocolViolation(
                        "started with no runnable process",
                    ));
                }
                log::info!("kernel started with {} processes", st.procs.count());
            }
        }

        enum Step {
            Run(Pid),
            Tick,
            Done,
        }

        let mut delivered = 0u64;
        loop {
            let step = {
                let mut st = self.state.lock();
                if st.fault.is_some() {
                    Step::Done
                } else if let Some(pid) = st.ready.head() {
                    st.switches += 1;
                    Step::Run(pid)
                } else if delivered == max_ticks || (!st.has_sleepers() && !st.has_timed_waiters())
                {
                    Step::Done
                } else {
                    st.clock_tick();
                    delivered += 1;
                    Step::Tick
                }
            };
            match step {
                Step::Run(pid) => self.platform.transfer(Resume::Process(pid)),
                Step::Tick => continue,
                Step::Done => break,
            }
        }

        let stats = self.stats(delivered);
        log::info!(
            "kernel idle after {} ticks, {} switches",
            stats.ticks,
            stats.switches
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::MonitorId;
    use std::vec;

    const STACK: usize = 64 * 1024;

    /// Single-slot buffer guarded by a monitor, the canonical client.
    struct Buffer {
        monitor: MonitorId,
        slot: StdMutex<Option<u32>>,
    }

    impl Buffer {
        fn new(kernel: &HostedKernel) -> Arc<Self> {
            Arc::new(Self {
                monitor: kernel.create_monitor().unwrap(),
                slot: StdMutex::new(None),
            })
        }

        fn put(&self, kernel: &HostedKernel, value: u32) {
            kernel.enter_monitor(self.monitor).unwrap();
            while self.slot.lock().unwrap().is_some() {
                kernel.wait().unwrap();
            }
            *self.slot.lock().unwrap() = Some(value);
            kernel.notify().unwrap();
            kernel.exit_monitor().unwrap();
        }

        fn get(&self, kernel: &HostedKernel) -> u32 {
            kernel.enter_monitor(self.monitor).unwrap();
            let value = loop {
                if let Some(v) = self.slot.lock().unwrap().take() {
                    break v;
                }
                kernel.wait().unwrap();
            };
            kernel.notify_all().unwrap();
            kernel.exit_monitor().unwrap();
            value
        }
    }

    #[test]
    fn test_producer_consumer_in_order() {
        let kernel = Kernel::hosted();
        let buffer = Buffer::new(&kernel);
        let consumed = Arc::new(StdMutex::new(Vec::new()));

        let (k, b) = (Arc::clone(&kernel), Arc::clone(&buffer));
        kernel
            .clone()
            .spawn(
                move || {
                    for v in [1, 2, 3] {
                        b.put(&k, v);
                    }
                },
                STACK,
            )
            .unwrap();

        let (k, b, out) = (Arc::clone(&kernel), buffer, Arc::clone(&consumed));
        kernel
            .clone()
            .spawn(
                move || {
                    for _ in 0..3 {
                        let v = b.get(&k);
                        out.lock().unwrap().push(v);
                    }
                },
                STACK,
            )
            .unwrap();

        let stats = kernel.run(100);
        assert!(stats.fault.is_none());
        assert_eq!(*consumed.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_yield_round_robin_order() {
        let kernel = Kernel::hosted();
        let order = Arc::new(StdMutex::new(Vec::new()));

        for i in 0..3u32 {
            let (k, out) = (Arc::clone(&kernel), Arc::clone(&order));
            kernel
                .clone()
                .spawn(
                    move || {
                        for _ in 0..2 {
                            out.lock().unwrap().push(i);
                            k.yield_now().unwrap();
                        }
                    },
                    STACK,
                )
                .unwrap();
        }

        let stats = kernel.run(10);
        assert!(stats.fault.is_none());
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_sleep_wakes_after_fifth_tick() {
        let kernel = Kernel::hosted();
        let woke_at = Arc::new(StdMutex::new(0u64));

        let (k, out) = (Arc::clone(&kernel), Arc::clone(&woke_at));
        kernel
            .clone()
            .spawn(
                move || {
                    k.sleep(5).unwrap();
                    *out.lock().unwrap() = k.ticks();
                },
                STACK,
            )
            .unwrap();

        let stats = kernel.run(20);
        assert!(stats.fault.is_none());
        assert_eq!(*woke_at.lock().unwrap(), 5);
        assert_eq!(stats.ticks, 5);
    }

    #[test]
    fn test_timed_wait_expires_without_notify() {
        let kernel = Kernel::hosted();
        let outcome = Arc::new(StdMutex::new(None));

        let (k, out) = (Arc::clone(&kernel), Arc::clone(&outcome));
        let m = kernel.create_monitor().unwrap();
        kernel
            .clone()
            .spawn(
                move || {
                    k.enter_monitor(m).unwrap();
                    let notified = k.timed_wait(3).unwrap();
                    k.exit_monitor().unwrap();
                    *out.lock().unwrap() = Some(notified);
                },
                STACK,
            )
            .unwrap();

        let stats = kernel.run(10);
        assert!(stats.fault.is_none());
        assert_eq!(*outcome.lock().unwrap(), Some(false));
        assert_eq!(stats.ticks, 3);
    }

    #[test]
    fn test_timed_wait_notified_in_time() {
        let kernel = Kernel::hosted();
        let outcome = Arc::new(StdMutex::new(None));
        let m = kernel.create_monitor().unwrap();

        let (k, out) = (Arc::clone(&kernel), Arc::clone(&outcome));
        kernel
            .clone()
            .spawn(
                move || {
                    k.enter_monitor(m).unwrap();
                    let notified = k.timed_wait(50).unwrap();
                    k.exit_monitor().unwrap();
                    *out.lock().unwrap() = Some(notified);
                },
                STACK,
            )
            .unwrap();

        let k = Arc::clone(&kernel);
        kernel
            .clone()
            .spawn(
                move || {
                    k.enter_monitor(m).unwrap();
                    k.notify().unwrap();
                    k.exit_monitor().unwrap();
                },
                STACK,
            )
            .unwrap();

        let stats = kernel.run(10);
        assert!(stats.fault.is_none());
        assert_eq!(*outcome.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_event_pair_single_slot_handoff() {
        // two paired events (empty/full) hand a value across without a
        // monitor
        let kernel = Kernel::hosted();
        let empty = kernel.create_event().unwrap();
        let full = kernel.create_event().unwrap();
        kernel.declencher(empty).unwrap();

        let slot = Arc::new(StdMutex::new(0u32));
        let consumed = Arc::new(StdMutex::new(Vec::new()));

        let (k, s) = (Arc::clone(&kernel), Arc::clone(&slot));
        kernel
            .clone()
            .spawn(
                move || {
                    for v in [10, 20, 30] {
                        k.attendre(empty).unwrap();
                        k.reinitialiser(empty).unwrap();
                        *s.lock().unwrap() = v;
                        k.declencher(full).unwrap();
                    }
                },
                STACK,
            )
            .unwrap();

        let (k, s, out) = (Arc::clone(&kernel), slot, Arc::clone(&consumed));
        kernel
            .clone()
            .spawn(
                move || {
                    for _ in 0..3 {
                        k.attendre(full).unwrap();
                        k.reinitialiser(full).unwrap();
                        out.lock().unwrap().push(*s.lock().unwrap());
                        k.declencher(empty).unwrap();
                    }
                },
                STACK,
            )
            .unwrap();

        let stats = kernel.run(100);
        assert!(stats.fault.is_none());
        assert_eq!(*consumed.lock().unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_deadlock_stays_blocked_without_crash() {
        let kernel = Kernel::hosted();
        let m1 = kernel.create_monitor().unwrap();
        let m2 = kernel.create_monitor().unwrap();

        let k = Arc::clone(&kernel);
        let x = kernel
            .clone()
            .spawn(
                move || {
                    k.enter_monitor(m1).unwrap();
                    k.yield_now().unwrap();
                    k.enter_monitor(m2).unwrap(); // blocks forever
                    unreachable!("deadlocked process must not resume");
                },
                STACK,
            )
            .unwrap();

        let k = Arc::clone(&kernel);
        let y = kernel
            .clone()
            .spawn(
                move || {
                    k.enter_monitor(m2).unwrap();
                    k.yield_now().unwrap();
                    k.enter_monitor(m1).unwrap(); // blocks forever
                    unreachable!("deadlocked process must not resume");
                },
                STACK,
            )
            .unwrap();

        let stats = kernel.run(10);
        // no crash, no false resolution: both remain blocked
        assert!(stats.fault.is_none());
        assert!(!kernel.is_ready(x));
        assert!(!kernel.is_ready(y));
    }

    #[test]
    fn test_wait_interrupt_resumes_at_ready_front() {
        let kernel = Kernel::hosted();
        let resumed = Arc::new(StdMutex::new(false));

        let (k, out) = (Arc::clone(&kernel), Arc::clone(&resumed));
        kernel
            .clone()
            .spawn(
                move || {
                    k.wait_interrupt(1).unwrap();
                    *out.lock().unwrap() = true;
                },
                STACK,
            )
            .unwrap();

        // first run parks the process on the line and goes idle
        let stats = kernel.run(5);
        assert!(stats.fault.is_none());
        assert!(!*resumed.lock().unwrap());

        // the line fires; the next run dispatches the waiter
        assert_eq!(kernel.raise_interrupt(1).unwrap(), 1);
        let stats = kernel.run(5);
        assert!(stats.fault.is_none());
        assert!(*resumed.lock().unwrap());
    }

    #[test]
    fn test_run_without_processes_faults() {
        let kernel = Kernel::hosted();
        let stats = kernel.run(5);
        assert_eq!(
            stats.fault,
            Some(Fault::ProtocolViolation("started with no runnable process"))
        );
    }

    #[test]
    fn test_nested_monitors_across_yields() {
        // nested enter/exit in the style of the dummy-monitor exercise
        let kernel = Kernel::hosted();
        let m1 = kernel.create_monitor().unwrap();
        let m2 = kernel.create_monitor().unwrap();
        let rounds = Arc::new(StdMutex::new(0u32));

        for _ in 0..2 {
            let (k, out) = (Arc::clone(&kernel), Arc::clone(&rounds));
            kernel
                .clone()
                .spawn(
                    move || {
                        for _ in 0..3 {
                            k.enter_monitor(m1).unwrap();
                            k.enter_monitor(m2).unwrap();
                            k.enter_monitor(m1).unwrap();
                            *out.lock().unwrap() += 1;
                            k.exit_monitor().unwrap();
                            k.exit_monitor().unwrap();
                            k.exit_monitor().unwrap();
                            k.yield_now().unwrap();
                        }
                    },
                    STACK,
                )
                .unwrap();
        }

        let stats = kernel.run(50);
        assert!(stats.fault.is_none());
        assert_eq!(*rounds.lock().unwrap(), 6);
    }
}
