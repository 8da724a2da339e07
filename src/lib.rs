//! noyau — a minimal cooperative micro-kernel
//!
//! Single-core scheduling for a fixed set of processes:
//! - Static process table (no heap, no allocation in the core)
//! - Round-robin ready list with a tick-driven time slice
//! - Reentrant monitors with Mesa-style wait/notify and timed waits
//! - Binary level-triggered events for broadcast signaling
//! - Sleep and interrupt-line waits off the same clock
//! - Halt-on-fault error policy: the first fault stops dispatch
//!
//! The core is `no_std` and platform-agnostic; context switching lives
//! behind the [`Platform`] trait. Enable the `std` feature for the
//! thread-backed [`hosted`] platform used in simulation and tests.

#![no_std]

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod clock;
pub mod context;
pub mod event;
pub mod fault;
pub mod kernel;
mod list;
pub mod monitor;
pub mod process;
mod sched;

#[cfg(any(test, feature = "std"))]
pub mod hosted;

pub use clock::{IRQ_LINES, TIME_SLICE};
pub use context::{Platform, Resume};
pub use event::{EventId, MAX_EVENTS};
pub use fault::Fault;
pub use kernel::{Kernel, RunStats};
pub use monitor::{MonitorId, MAX_MONITORS};
pub use process::{Pid, MAX_NESTED, MAX_PROCESSES};

#[cfg(any(test, feature = "std"))]
pub use hosted::{HostedKernel, HostedPlatform};
