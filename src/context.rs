//! Context-switch seam — the architecture-specific primitive
//!
//! The kernel never saves or restores registers itself. It decides who runs
//! next and delegates the actual handoff to a [`Platform`]: build an opaque
//! resumable context from an entry point and a stack size, and transfer
//! control between contexts. A transfer is not a call: the target resumes
//! exactly after whatever suspension point it last blocked at.
//!
//! The hosted platform in [`crate::hosted`] backs each context with an OS
//! thread; an embedded port would back it with a register frame and a
//! stack buffer.

use crate::fault::Fault;
use crate::process::Pid;

/// Where a transfer hands control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// A specific process (always the ready-list head).
    Process(Pid),
    /// The idle context: the ready list is empty. On the hosted platform
    /// this is the driver loop, which doubles as the clock process.
    Idle,
}

/// The external context-switch primitive.
pub trait Platform {
    /// Platform-specific entry point type (a function pointer on bare
    /// metal, a boxed closure on the hosted platform).
    type Entry;

    /// Build a suspended, resumable context for a freshly admitted
    /// process. Fails with [`Fault::ResourceExhausted`] if the stack
    /// cannot be allocated.
    fn create_context(&self, pid: Pid, entry: Self::Entry, stack_size: usize)
        -> Result<(), Fault>;

    /// Suspend the calling context and resume `target`. Returns when some
    /// later transfer hands control back to the caller.
    fn transfer(&self, target: Resume);

    /// Resume `target` without suspending the caller. Used when the caller
    /// is exiting for good, and to wake the idle context after a fault
    /// latches.
    fn resume(&self, target: Resume);
}
