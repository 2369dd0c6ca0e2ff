//! `weak_ref` (§4.8): copyable, generation-tagged handle to a cache slot.

use std::sync::Arc;

use super::cache::{self, Cache};
use super::strong_ref::StrongRef;

pub struct WeakRef<T, const CAP: usize> {
    cache: Arc<Cache<T, CAP>>,
    index: usize,
    aba: u64,
}

impl<T, const CAP: usize> WeakRef<T, CAP> {
    pub(super) fn new(cache: Arc<Cache<T, CAP>>, index: usize, aba: u64) -> Self {
        WeakRef { cache, index, aba }
    }

    /// Upgrades to a [`StrongRef`] iff the block's current generation
    /// still matches the one this handle was issued for (§8 invariant
    /// 6).
    pub fn upgrade(&self) -> Option<StrongRef<T, CAP>> {
        cache::upgrade(&self.cache, self.index, self.aba)
    }

    /// `true` iff the slot has moved on to a later generation since
    /// this handle was issued. A stale `WeakRef` can never upgrade
    /// again.
    pub fn is_stale(&self) -> bool {
        self.cache.block(self.index).aba() != self.aba
    }
}

impl<T, const CAP: usize> Clone for WeakRef<T, CAP> {
    fn clone(&self) -> Self {
        self.cache.block(self.index).weak_ref();
        WeakRef {
            cache: Arc::clone(&self.cache),
            index: self.index,
            aba: self.aba,
        }
    }
}

impl<T, const CAP: usize> Drop for WeakRef<T, CAP> {
    fn drop(&mut self) {
        if self.cache.block(self.index).weak_unref() {
            self.cache.try_release(self.index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::cache::Cache;

    #[test]
    fn clone_and_drop_both_decrement_exactly_once() {
        let cache: std::sync::Arc<Cache<u32, 2>> = Cache::new();
        let w1 = cache.acquire().unwrap();
        let w2 = w1.clone();
        assert!(!w1.is_stale());
        drop(w1);
        assert!(w2.upgrade().is_some());
        drop(w2);
    }
}
