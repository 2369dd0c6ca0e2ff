//! Bounded weak/strong reference cache (§C10, §4.8).

use std::sync::Arc;

use super::control_block::ControlBlock;
use super::queue::SlotQueue;
use super::strong_ref::StrongRef;
use super::weak_ref::WeakRef;

/// How many `maybe_used` entries one `acquire` call will examine before
/// giving up (§4.8 step 2, "walk ... up to N times").
const MAX_RECLAIM_SCAN: usize = 8;

pub struct Cache<T, const CAP: usize> {
    blocks: Box<[ControlBlock<T>]>,
    unused: SlotQueue,
    maybe_used: SlotQueue,
}

impl<T: Default, const CAP: usize> Cache<T, CAP> {
    pub fn new() -> Arc<Self> {
        let blocks: Vec<ControlBlock<T>> = (0..CAP).map(|_| ControlBlock::new()).collect();
        Arc::new(Cache {
            blocks: blocks.into_boxed_slice(),
            unused: SlotQueue::filled(CAP),
            maybe_used: SlotQueue::empty(),
        })
    }
}

impl<T, const CAP: usize> Cache<T, CAP> {
    pub fn capacity(&self) -> usize {
        CAP
    }

    pub(super) fn block(&self, idx: usize) -> &ControlBlock<T> {
        &self.blocks[idx]
    }
}

impl<T: Default, const CAP: usize> Cache<T, CAP> {
    /// §4.8 `acquire()`. Returns `None` once both the unused pool and
    /// every `maybe_used` slot examined in this call are unavailable
    /// (§4.8 step 3, §8 scenario S6).
    pub fn acquire(self: &Arc<Self>) -> Option<WeakRef<T, CAP>> {
        if let Some(idx) = self.unused.pop() {
            let claimed = self.blocks[idx].make_exclusive();
            debug_assert!(claimed, "slot popped from the unused queue must be FREE");
            return Some(self.claim_and_publish(idx));
        }

        for _ in 0..MAX_RECLAIM_SCAN {
            let idx = self.maybe_used.pop()?;
            if self.blocks[idx].make_exclusive() {
                return Some(self.claim_and_publish(idx));
            }
            self.maybe_used.push(idx);
        }
        None
    }

    fn claim_and_publish(self: &Arc<Self>, idx: usize) -> WeakRef<T, CAP> {
        let block = &self.blocks[idx];
        block.reinit(T::default());
        self.maybe_used.push(idx);
        WeakRef::new(Arc::clone(self), idx, block.aba())
    }
}

impl<T, const CAP: usize> Cache<T, CAP> {
    /// §4.8 `release(block)`: invoked by a ref's drop once its refcount
    /// transition makes reclamation possible. Moves the slot back to
    /// `unused` if the exclusive claim succeeds; otherwise a concurrent
    /// acquirer already won the race and the slot is left alone.
    pub(super) fn try_release(&self, idx: usize) {
        if self.blocks[idx].make_exclusive() {
            self.blocks[idx].retire();
            self.maybe_used.remove(idx);
            self.unused.push(idx);
        }
    }
}

/// Upgrades a live, still-current `WeakRef` into a `StrongRef`,
/// pinning the block. Returns `None` if the generation has already
/// moved on (§8 invariant 6).
pub(super) fn upgrade<T, const CAP: usize>(
    cache: &Arc<Cache<T, CAP>>,
    index: usize,
    aba: u64,
) -> Option<StrongRef<T, CAP>> {
    let block = cache.block(index);
    if block.aba() != aba {
        return None;
    }
    if !block.try_strong_ref() {
        return None;
    }
    if block.aba() != aba {
        // The slot was reclaimed and republished between our check and
        // our increment; undo it immediately. If undoing also makes
        // this the last reference, try_release runs the same way a
        // real StrongRef::drop would.
        if block.strong_unref() {
            cache.try_release(index);
        }
        return None;
    }
    Some(StrongRef::new(Arc::clone(cache), index, aba))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_upgrade_drop_round_trips() {
        let cache: Arc<Cache<u32, 4>> = Cache::new();
        let w1 = cache.acquire().expect("capacity available");
        let s1 = w1.upgrade().expect("freshly acquired generation");
        drop(s1);
        drop(w1);
    }

    #[test]
    fn stale_weak_ref_fails_to_upgrade_after_reclamation() {
        // §8 scenario S5: w1 is retained (never dropped) past its
        // generation's reclamation. Its later upgrade must fail even
        // though the slot itself has been handed out again as w2.
        let cache: Arc<Cache<u32, 1>> = Cache::new();
        let w1 = cache.acquire().expect("capacity available");
        drop(w1.upgrade().expect("freshly acquired generation"));

        let w2 = cache
            .acquire()
            .expect("maybe_used walk reclaims the idle slot even with w1 still live");
        assert!(w2.upgrade().is_some());
        assert!(
            w1.upgrade().is_none(),
            "w1's generation snapshot is stale after reclamation"
        );
    }

    #[test]
    fn contended_capacity_one_blocks_until_release() {
        let cache: Arc<Cache<u32, 1>> = Cache::new();
        let w = cache.acquire().unwrap();
        let s = w.upgrade().unwrap();

        assert!(cache.acquire().is_none(), "capacity 1 is fully held");
        assert!(cache.acquire().is_none());

        drop(s);
        drop(w);
        assert!(cache.acquire().is_some(), "slot freed after last ref dropped");
    }
}
