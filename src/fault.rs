//! Kernel fault taxonomy
//!
//! Every failure the kernel can detect falls into one of three kinds, and
//! none of them is recoverable: the first fault latches in the kernel state
//! and every subsequent operation replays it. Once an invariant has been
//! observed broken, the whole kernel stops, not just the offending process.

use core::fmt;

/// A fatal kernel fault.
///
/// The payload names the violated rule; it is fixed at the fault site and
/// carried for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A fixed-size pool (process table, monitor/event pools, the nested
    /// monitor call stack) or the platform's stack allocation ran out.
    ResourceExhausted(&'static str),
    /// An id that does not name a live monitor, event, or interrupt line.
    InvalidHandle(&'static str),
    /// An operation used outside its protocol (wait/notify/exit without
    /// ownership, post-wait ownership inconsistency, calls after halt).
    ProtocolViolation(&'static str),
}

impl Fault {
    /// Short human-readable description of the violated rule.
    pub fn detail(&self) -> &'static str {
        match self {
            Fault::ResourceExhausted(d) => d,
            Fault::InvalidHandle(d) => d,
            Fault::ProtocolViolation(d) => d,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::ResourceExhausted(d) => write!(f, "resource exhausted: {d}"),
            Fault::InvalidHandle(d) => write!(f, "invalid handle: {d}"),
            Fault::ProtocolViolation(d) => write!(f, "protocol violation: {d}"),
        }
    }
}
