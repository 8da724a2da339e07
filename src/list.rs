//! Intrusive FIFO lists over the process table
//!
//! Every queue in the kernel (ready, sleeping, monitor entry/waiting/timed,
//! event waiters, interrupt waiters) is a [`WaitList`]: head and tail
//! handles into the process table, linked through each slot's `next` field.
//! Insertion order is wake order. A process belongs to at most one list at
//! a time; the `in_list` bit enforces that in debug builds.

use crate::process::{Pid, ProcTable};

/// FIFO queue of processes, storage borrowed from the process table.
#[derive(Default)]
pub(crate) struct WaitList {
    head: Option<Pid>,
    tail: Option<Pid>,
    len: usize,
}

impl WaitList {
    pub(crate) const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Head of the list without removing it.
    pub(crate) fn head(&self) -> Option<Pid> {
        self.head
    }

    #[cfg(any(test, feature = "std"))]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[cfg(any(test, feature = "std"))]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Append to the tail.
    pub(crate) fn push_back(&mut self, procs: &mut ProcTable, pid: Pid) {
        debug_assert!(!procs[pid].in_list, "process already queued");
        procs[pid].next = None;
        procs[pid].in_list = true;
        match self.tail {
            Some(tail) => procs[tail].next = Some(pid),
            None => self.head = Some(pid),
        }
        self.tail = Some(pid);
        self.len += 1;
    }

    /// Prepend to the head.
    pub(crate) fn push_front(&mut self, procs: &mut ProcTable, pid: Pid) {
        debug_assert!(!procs[pid].in_list, "process already queued");
        procs[pid].next = self.head;
        procs[pid].in_list = true;
        if self.head.is_none() {
            self.tail = Some(pid);
        }
        self.head = Some(pid);
        self.len += 1;
    }

    /// Remove and return the head, `None` on an empty list.
    pub(crate) fn pop_front(&mut self, procs: &mut ProcTable) -> Option<Pid> {
        let head = self.head?;
        self.head = procs[head].next;
        if self.head.is_none() {
            self.tail = None;
        }
        procs[head].next = None;
        procs[head].in_list = false;
        self.len -= 1;
        Some(head)
    }

    /// Walk the list looking for a process.
    pub(crate) fn contains(&self, procs: &ProcTable, pid: Pid) -> bool {
        let mut cursor = self.head;
        while let Some(p) = cursor {
            if p == pid {
                return true;
            }
            cursor = procs[p].next;
        }
        false
    }

    /// Detach the whole list, leaving this one empty. Used by the clock to
    /// rebuild a queue while aging it.
    pub(crate) fn take(&mut self) -> WaitList {
        core::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(n: usize) -> (ProcTable, std::vec::Vec<Pid>) {
        let mut t = ProcTable::new();
        let pids = (0..n).map(|_| t.admit().unwrap()).collect();
        (t, pids)
    }

    #[test]
    fn test_fifo_order() {
        let (mut t, p) = table(3);
        let mut list = WaitList::new();
        for &pid in &p {
            list.push_back(&mut t, pid);
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.pop_front(&mut t), Some(p[0]));
        assert_eq!(list.pop_front(&mut t), Some(p[1]));
        assert_eq!(list.pop_front(&mut t), Some(p[2]));
        assert_eq!(list.pop_front(&mut t), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_push_front() {
        let (mut t, p) = table(2);
        let mut list = WaitList::new();
        list.push_back(&mut t, p[0]);
        list.push_front(&mut t, p[1]);
        assert_eq!(list.head(), Some(p[1]));
        assert_eq!(list.pop_front(&mut t), Some(p[1]));
        assert_eq!(list.pop_front(&mut t), Some(p[0]));
    }

    #[test]
    fn test_rotate() {
        // yield = remove head, append tail
        let (mut t, p) = table(3);
        let mut list = WaitList::new();
        for &pid in &p {
            list.push_back(&mut t, pid);
        }
        for expected in [p[1], p[2], p[0], p[1]] {
            let head = list.pop_front(&mut t).unwrap();
            list.push_back(&mut t, head);
            assert_eq!(list.head(), Some(expected));
        }
    }

    #[test]
    fn test_contains() {
        let (mut t, p) = table(3);
        let mut list = WaitList::new();
        list.push_back(&mut t, p[0]);
        list.push_back(&mut t, p[2]);
        assert!(list.contains(&t, p[0]));
        assert!(!list.contains(&t, p[1]));
        assert!(list.contains(&t, p[2]));
    }

    #[test]
    fn test_take_leaves_empty() {
        let (mut t, p) = table(2);
        let mut list = WaitList::new();
        list.push_back(&mut t, p[0]);
        list.push_back(&mut t, p[1]);
        let mut drained = list.take();
        assert!(list.is_empty());
        assert_eq!(drained.pop_front(&mut t), Some(p[0]));
        assert_eq!(drained.pop_front(&mut t), Some(p[1]));
    }

    #[test]
    fn test_single_element_tail_reset() {
        let (mut t, p) = table(1);
        let mut list = WaitList::new();
        list.push_back(&mut t, p[0]);
        assert_eq!(list.pop_front(&mut t), Some(p[0]));
        // list must be reusable after draining to empty
        list.push_back(&mut t, p[0]);
        assert_eq!(list.head(), Some(p[0]));
        assert_eq!(list.len(), 1);
    }
}
