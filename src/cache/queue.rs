//! Approximate-LRU "maybe-used" worklist (§9 Open Questions, §4.8).
//!
//! The source material's later cache iteration has a lock-free counting
//! queue with unproven `TODO`/`goto retry` patterns (`counting_queue.hpp`).
//! Per the Open Question resolution in that section, this is a plain
//! mutex-protected queue instead. Membership here is advisory, not
//! authoritative: the real state lives in each `ControlBlock`'s atomics,
//! so a slot transiently appearing in the wrong queue (or briefly in
//! neither) during a race is harmless — the next CAS attempt against it
//! either succeeds or fails honestly.

use std::collections::VecDeque;
use std::sync::Mutex;

pub struct SlotQueue {
    slots: Mutex<VecDeque<usize>>,
}

impl SlotQueue {
    pub fn filled(count: usize) -> Self {
        SlotQueue {
            slots: Mutex::new((0..count).collect()),
        }
    }

    pub fn empty() -> Self {
        SlotQueue {
            slots: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, idx: usize) {
        self.slots.lock().unwrap().push_back(idx);
    }

    pub fn pop(&self) -> Option<usize> {
        self.slots.lock().unwrap().pop_front()
    }

    /// Removes one occurrence of `idx`, if present. Used when a
    /// refcount-triggered reclamation beats a walking `acquire` to the
    /// same slot.
    pub fn remove(&self, idx: usize) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(pos) = slots.iter().position(|&i| i == idx) {
            slots.remove(pos);
        }
    }
}
