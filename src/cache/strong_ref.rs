//! `strong_ref` (§4.8): move-only, pins its generation's value against
//! reclamation until dropped.

use std::ops::Deref;
use std::sync::Arc;

use super::cache::Cache;

pub struct StrongRef<T, const CAP: usize> {
    cache: Arc<Cache<T, CAP>>,
    index: usize,
    #[cfg(debug_assertions)]
    aba: u64,
}

impl<T, const CAP: usize> StrongRef<T, CAP> {
    pub(super) fn new(cache: Arc<Cache<T, CAP>>, index: usize, #[allow(unused_variables)] aba: u64) -> Self {
        StrongRef {
            cache,
            index,
            #[cfg(debug_assertions)]
            aba,
        }
    }
}

impl<T, const CAP: usize> Deref for StrongRef<T, CAP> {
    type Target = T;

    fn deref(&self) -> &T {
        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.cache.block(self.index).aba(),
            self.aba,
            "a live StrongRef must pin its generation"
        );
        // SAFETY: holding a `StrongRef` keeps `strong > UNREFERENCED`,
        // which makes `make_exclusive`'s CAS fail for anyone trying to
        // reinitialize this slot, so the value cannot change or move
        // out from under this reference for as long as it is live.
        unsafe { self.cache.block(self.index).value() }
    }
}

impl<T, const CAP: usize> Drop for StrongRef<T, CAP> {
    fn drop(&mut self) {
        if self.cache.block(self.index).strong_unref() {
            self.cache.try_release(self.index);
        }
    }
}
