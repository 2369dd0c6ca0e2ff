//! The deadline stack (§C3): single-writer, multi-reader, lock-free.
//!
//! Only the owning thread calls [`Stack::push`]/[`Stack::pop`]. Any
//! number of other threads may call [`Stack::top`], [`Stack::count`],
//! [`Stack::peek`], or [`Stack::scan_and_claim`] concurrently with the
//! owner and with each other. The only synchronizing act on the hot
//! path is the monotonic `count`; no CAS is needed on the stack's own
//! link structure, only on individual entries' `deadline` fields.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::entry::{CheckpointEntry, CheckpointSnapshot};
use crate::time;

pub struct Stack {
    top: AtomicPtr<CheckpointEntry>,
    count: AtomicU64,
}

impl Stack {
    pub const fn new() -> Self {
        Stack {
            top: AtomicPtr::new(ptr::null_mut()),
            count: AtomicU64::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.top.load(Ordering::Relaxed).is_null()
    }

    /// Pushes `entry` onto the stack. Single-writer only.
    ///
    /// The modification counter is incremented *before* the pointer
    /// changes, so a reader that samples `count`, then `top`, then
    /// re-samples `count` and finds it unchanged can be sure no push
    /// began in that window.
    pub fn push(&self, entry: *mut CheckpointEntry) {
        unsafe {
            let seq = self.count.fetch_add(1, Ordering::Release);
            (*entry).sequence = seq;
            let prev = self.top.load(Ordering::Relaxed);
            (*entry).next = prev;
            self.top.store(entry, Ordering::Release);
        }
    }

    /// Pops the top entry. Single-writer only. `count` is deliberately
    /// *not* incremented here: readers validate via `count` equality,
    /// and a pop racing with a reader's memcpy is benign because the
    /// entry memory survives in the arena regardless of which `top`
    /// the reader observed.
    pub fn pop(&self) -> Option<*mut CheckpointEntry> {
        let p = self.top.load(Ordering::Relaxed);
        if p.is_null() {
            return None;
        }
        unsafe {
            let next = (*p).next;
            self.top.store(next, Ordering::Release);
        }
        Some(p)
    }

    pub fn top(&self) -> *mut CheckpointEntry {
        self.top.load(Ordering::Acquire)
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Reader pattern for a single entry: optimistic memcpy validated
    /// against the modification counter.
    pub fn peek(&self) -> Option<CheckpointSnapshot> {
        loop {
            let p = self.top.load(Ordering::Acquire);
            if p.is_null() {
                return None;
            }
            let c0 = self.count.load(Ordering::Acquire);
            let snapshot = unsafe {
                let entry = &*p;
                CheckpointSnapshot {
                    deadline: entry.deadline.load(Ordering::Relaxed),
                    id: entry.id,
                    location: entry.location,
                    start: entry.start,
                    sequence: entry.sequence,
                }
            };
            if self.count.load(Ordering::Acquire) == c0 {
                return Some(snapshot);
            }
        }
    }

    /// The watchdog's full-stack walk (§4.6 `check_all`).
    ///
    /// Walks from `top` following `next` links, aborting as soon as
    /// `count` has changed since the walk began (the stack mutated
    /// mid-scan; duplicate reporting is avoided by bailing out rather
    /// than continuing on possibly-rearranged structure, even though
    /// the entry memory itself remains valid either way). For each
    /// still-armed entry (`deadline != 0`) that is now overdue, attempts
    /// to claim it via CAS and, on success, invokes `on_violation` with
    /// the entry and the observed delta.
    pub fn scan_and_claim<F>(&self, now: u64, mut on_violation: F)
    where
        F: FnMut(&CheckpointEntry, u64),
    {
        let c0 = self.count.load(Ordering::Acquire);
        let mut p = self.top.load(Ordering::Acquire);
        while !p.is_null() {
            let entry = unsafe { &*p };
            let d = entry.deadline.load(Ordering::Relaxed);
            if self.count.load(Ordering::Acquire) != c0 {
                break;
            }
            if d != 0 {
                let (after, delta) = time::delta_if_after(now, d);
                if after
                    && entry
                        .deadline
                        .compare_exchange(d, 0, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                {
                    on_violation(entry, delta);
                }
            }
            p = entry.next;
        }
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::EntryAllocator;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_pop_balances_depth() {
        let stack = Stack::new();
        let mut alloc = EntryAllocator::new();
        let e1 = alloc.allocate();
        let e2 = alloc.allocate();
        stack.push(e1);
        stack.push(e2);
        assert!(!stack.is_empty());
        let popped2 = stack.pop().unwrap();
        assert_eq!(popped2, e2);
        let popped1 = stack.pop().unwrap();
        assert_eq!(popped1, e1);
        assert!(stack.pop().is_none());
        alloc.deallocate(e1);
        alloc.deallocate(e2);
    }

    #[test]
    fn count_increments_only_on_push() {
        let stack = Stack::new();
        let mut alloc = EntryAllocator::new();
        let e1 = alloc.allocate();
        stack.push(e1);
        assert_eq!(stack.count(), 1);
        stack.pop();
        assert_eq!(stack.count(), 1);
        alloc.deallocate(e1);
    }

    #[test]
    fn concurrent_peek_never_observes_torn_entry() {
        let stack = Arc::new(Stack::new());
        let mut alloc = EntryAllocator::new();
        let entries: Vec<_> = (0..64).map(|_| alloc.allocate()).collect();
        for (i, e) in entries.iter().enumerate() {
            unsafe {
                (**e).id = crate::entry::CheckpointId(i as u64 + 1);
                (**e).deadline.store(1000 + i as u64, Ordering::Relaxed);
            }
        }

        let reader_stack = Arc::clone(&stack);
        let reader = thread::spawn(move || {
            for _ in 0..5000 {
                if let Some(snap) = reader_stack.peek() {
                    assert!(snap.id.0 <= 64);
                    assert!(snap.deadline >= 1000 || snap.deadline == 0);
                }
            }
        });

        for e in entries {
            stack.push(e);
        }
        while !stack.is_empty() {
            stack.pop();
        }
        reader.join().unwrap();
    }
}
