//! Thread-local entry arena (§C4).
//!
//! Not thread-safe by design: each `EntryAllocator` lives in exactly one
//! thread's thread-local storage. Entries are never returned across
//! threads. Batches are only ever freed when the allocator itself is
//! dropped (thread exit), which is what lets a watchdog mid-scan keep
//! dereferencing an entry's address safely: the memory it points to is
//! recycled, never unmapped, for as long as the owning thread lives.

use crate::entry::CheckpointEntry;

const BATCH_SIZE: usize = 128;

pub struct EntryAllocator {
    batches: Vec<Box<[CheckpointEntry]>>,
    free: Vec<*mut CheckpointEntry>,
}

impl EntryAllocator {
    pub fn new() -> Self {
        EntryAllocator {
            batches: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Pops a recycled entry, growing by one batch if the free-list is
    /// empty. Allocation failure is unrecoverable: the monitor cannot
    /// guarantee correctness without the slot, so we let the allocator
    /// abort the way the rest of the standard library does on OOM
    /// rather than returning a sentinel the caller could ignore.
    pub fn allocate(&mut self) -> *mut CheckpointEntry {
        if self.free.is_empty() {
            self.grow();
        }
        self.free
            .pop()
            .expect("entry allocator grow() must refill the free-list")
    }

    pub fn deallocate(&mut self, entry: *mut CheckpointEntry) {
        self.free.push(entry);
    }

    fn grow(&mut self) {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        batch.resize_with(BATCH_SIZE, CheckpointEntry::default);
        let mut boxed = batch.into_boxed_slice();
        for entry in boxed.iter_mut() {
            self.free.push(entry as *mut CheckpointEntry);
        }
        self.batches.push(boxed);
    }
}

impl Default for EntryAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycled_addresses_stay_stable_across_batches() {
        let mut alloc = EntryAllocator::new();
        let mut handed_out = Vec::new();
        for _ in 0..BATCH_SIZE * 3 {
            handed_out.push(alloc.allocate());
        }
        // All addresses distinct: no aliasing within a single grow pass.
        let mut sorted = handed_out.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), handed_out.len());

        for p in handed_out {
            alloc.deallocate(p);
        }
        // Recycling reuses freed slots instead of growing again.
        let reused = alloc.allocate();
        assert!(alloc.batches.len() <= 3);
        alloc.deallocate(reused);
    }
}
