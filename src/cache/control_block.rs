//! Cache control block (§C10, §4.8): the atomic state machine behind
//! one pooled slot.
//!
//! Strong-count encoding. The source material models this with subtle,
//! inconsistent variants across iterations (§9 Open Questions); this
//! crate fixes one consistent reading and uses it everywhere: `0` free,
//! `1` exclusive (mid-transition, owned by exactly the thread that CAS'd
//! it there), `2` resting/allocated with no outstanding strong ref, and
//! every value above `2` is `2 + (live StrongRef count)`.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub const FREE: u32 = 0;
pub const EXCLUSIVE: u32 = 1;
pub const UNREFERENCED: u32 = 2;

pub struct ControlBlock<T> {
    value: UnsafeCell<T>,
    strong: AtomicU32,
    weak: AtomicU32,
    aba: AtomicU64,
}

// SAFETY: `value` is only ever written while the writer holds the
// exclusive claim (`strong == EXCLUSIVE`, itself only reachable via a
// winning CAS held by one thread at a time) and only ever read through
// a live `StrongRef`, which by construction pins `strong` above
// `UNREFERENCED` and so excludes a concurrent exclusive claim. Requiring
// `T: Send + Sync` matches `Arc<T>`'s own bound for the same reason:
// multiple `StrongRef`s may read `&T` from different threads at once.
unsafe impl<T: Send + Sync> Sync for ControlBlock<T> {}

impl<T: Default> ControlBlock<T> {
    pub fn new() -> Self {
        ControlBlock {
            value: UnsafeCell::new(T::default()),
            strong: AtomicU32::new(FREE),
            weak: AtomicU32::new(0),
            aba: AtomicU64::new(0),
        }
    }
}

impl<T> ControlBlock<T> {
    pub fn aba(&self) -> u64 {
        self.aba.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub fn weak_count(&self) -> u32 {
        self.weak.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn strong_count(&self) -> u32 {
        self.strong.load(Ordering::Relaxed)
    }

    /// SAFETY: caller must hold a live `StrongRef` (or otherwise know
    /// the block is pinned) for as long as the returned reference is
    /// used.
    pub unsafe fn value(&self) -> &T {
        &*self.value.get()
    }

    /// CAS-loop: `strong: s -> s+1` while `s >= UNREFERENCED` (§4.8
    /// `try_strong_ref`).
    pub fn try_strong_ref(&self) -> bool {
        let mut current = self.strong.load(Ordering::Relaxed);
        loop {
            if current < UNREFERENCED {
                return false;
            }
            match self.strong.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Decrements `strong`. Returns `true` if the caller should attempt
    /// reclamation: the count fell to `UNREFERENCED` with no weak refs
    /// outstanding (§4.8 `strong_unref`).
    pub fn strong_unref(&self) -> bool {
        let prev = self.strong.fetch_sub(1, Ordering::Release);
        debug_assert!(prev > FREE, "strong_unref on a block with no strong ref");
        prev - 1 == UNREFERENCED && self.weak.load(Ordering::Acquire) == 0
    }

    pub fn weak_ref(&self) {
        self.weak.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements `weak`. Returns `true` if the caller should attempt
    /// reclamation: no weak refs left and strong is at or below
    /// `UNREFERENCED` (§4.8 "`weak == 0` and `strong <= UNREFERENCED`").
    pub fn weak_unref(&self) -> bool {
        let prev = self.weak.fetch_sub(1, Ordering::Release);
        debug_assert!(prev > 0, "weak_unref on a block with no weak ref");
        prev - 1 == 0 && self.strong.load(Ordering::Acquire) <= UNREFERENCED
    }

    /// CAS-claims the block for reinitialization or retirement:
    /// `FREE -> EXCLUSIVE` or `UNREFERENCED -> EXCLUSIVE`.
    pub fn make_exclusive(&self) -> bool {
        self.strong
            .compare_exchange(FREE, EXCLUSIVE, Ordering::AcqRel, Ordering::Relaxed)
            .or_else(|_| {
                self.strong.compare_exchange(
                    UNREFERENCED,
                    EXCLUSIVE,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
            })
            .is_ok()
    }

    /// Publishes a new generation: overwrites the value, bumps `aba`,
    /// and adds the one outstanding weak ref the caller is about to
    /// hand out. Deliberately `fetch_add` rather than `store`: `weak`
    /// counts live handles to the *slot*, not to a generation, so a
    /// stale `WeakRef` from the generation being reclaimed here may
    /// still be holding a count that must survive into this one (its
    /// eventual drop will decrement it exactly once, same as any other
    /// weak ref). Caller must currently hold the exclusive claim.
    pub fn reinit(&self, value: T) {
        unsafe {
            *self.value.get() = value;
        }
        self.aba.fetch_add(1, Ordering::Release);
        self.weak.fetch_add(1, Ordering::Relaxed);
        self.strong.store(UNREFERENCED, Ordering::Release);
    }

    /// Returns a retired block to `FREE`, generation unchanged, to be
    /// reinitialized by a future `acquire`. Caller must currently hold
    /// the exclusive claim.
    pub fn retire(&self) {
        self.strong.store(FREE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_block_is_free_and_unclaimed() {
        let block: ControlBlock<u32> = ControlBlock::new();
        assert_eq!(block.strong_count(), FREE);
        assert_eq!(block.weak_count(), 0);
    }

    #[test]
    fn reinit_leaves_one_weak_ref_and_unreferenced_strong() {
        let block: ControlBlock<u32> = ControlBlock::new();
        assert!(block.make_exclusive());
        block.reinit(7);
        assert_eq!(block.strong_count(), UNREFERENCED);
        assert_eq!(block.weak_count(), 1);
        assert_eq!(unsafe { *block.value() }, 7);
    }

    #[test]
    fn try_strong_ref_fails_below_unreferenced() {
        let block: ControlBlock<u32> = ControlBlock::new();
        assert!(!block.try_strong_ref());
        assert!(block.make_exclusive());
        assert!(!block.try_strong_ref());
    }

    #[test]
    fn strong_unref_signals_reclaim_only_when_weakless() {
        let block: ControlBlock<u32> = ControlBlock::new();
        assert!(block.make_exclusive());
        block.reinit(1);
        assert!(block.try_strong_ref());
        assert!(!block.strong_unref(), "weak ref still outstanding");
        assert!(block.weak_unref());
    }
}
