//! Public operations (§C8): the only part of the crate application code
//! is expected to call directly.
//!
//! `mode-off`/`mode-passive`/`mode-active` are meant as mutually
//! exclusive choices (§6); `mode-off` bodies are compiled in place of the
//! real ones rather than layered on top, so enabling it collapses every
//! operation here to an empty inline function with no remaining call
//! into `stack`/`allocator`/`stats` at all.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::entry::{CheckpointId, Location};
use crate::error::MonitorError;
use crate::registry::ThreadRegistry;
use crate::report;
use crate::thread_state::Handler;
use crate::time::{self, Nanos, TimeUnit};

#[cfg(feature = "stats")]
use crate::stats;

#[cfg(feature = "mode-active")]
use crate::watchdog::Watchdog;

thread_local! {
    static ALLOCATOR: RefCell<crate::allocator::EntryAllocator> =
        RefCell::new(crate::allocator::EntryAllocator::new());
    static BINDING: RefCell<Option<Binding>> = RefCell::new(None);
}

/// Identifies which `Monitor` (if any) the calling thread is currently
/// registered with. A thread can only ever be bound to one monitor at a
/// time, mirroring the single thread-local pointer of §4.5.
struct Binding {
    monitor: *const (),
    index: usize,
}

/// A deadline-progress monitor: a registry of monitored threads plus
/// (in `mode-active`) the watchdog that scans them.
///
/// `CAP` bounds the number of simultaneously-registered threads; `U`
/// picks the time unit every deadline in this monitor is expressed in.
pub struct Monitor<const CAP: usize, U: TimeUnit = Nanos> {
    registry: Arc<ThreadRegistry<CAP>>,
    #[cfg(feature = "mode-active")]
    watchdog: Watchdog<CAP>,
    _unit: PhantomData<U>,
}

impl<const CAP: usize, U: TimeUnit> Monitor<CAP, U> {
    pub fn new() -> Self {
        let registry = Arc::new(ThreadRegistry::new());
        Monitor {
            #[cfg(feature = "mode-active")]
            watchdog: Watchdog::new(Arc::clone(&registry)),
            registry,
            _unit: PhantomData,
        }
    }

    fn identity(&self) -> *const () {
        Arc::as_ptr(&self.registry) as *const ()
    }

    fn with_bound_state<R>(&self, f: impl FnOnce(&crate::thread_state::ThreadState) -> R) -> Option<R> {
        BINDING.with(|b| {
            let bound = b.borrow();
            let bound = bound.as_ref()?;
            if bound.monitor != self.identity() {
                return None;
            }
            Some(f(self.registry.state(bound.index)))
        })
    }

    /// Registers the calling thread. The ergonomic, checked entry point
    /// (§7 "recoverable outcomes").
    pub fn try_register_thread(&self) -> Result<(), MonitorError> {
        let index = self
            .registry
            .register_current_thread()
            .ok_or(MonitorError::RegistryFull)?;
        BINDING.with(|b| {
            *b.borrow_mut() = Some(Binding {
                monitor: self.identity(),
                index,
            });
        });
        tracing::debug!(index, "thread registered");
        Ok(())
    }

    /// Registers the calling thread, or aborts. §7 treats registry
    /// exhaustion as the caller's fatal error, not a recoverable one, at
    /// this raw entry point; use [`Monitor::try_register_thread`] for
    /// the checked variant.
    pub fn register_thread(&self) {
        if self.try_register_thread().is_err() {
            tracing::error!("thread registry at capacity, aborting");
            std::process::abort();
        }
    }

    /// Deregisters the calling thread. A no-op if it was never
    /// registered with this monitor.
    pub fn deregister_thread(&self) {
        let index = BINDING.with(|b| {
            let mut bound = b.borrow_mut();
            let ours = bound
                .as_ref()
                .map_or(false, |binding| binding.monitor == self.identity());
            if ours {
                bound.take().map(|binding| binding.index)
            } else {
                None
            }
        });
        let Some(index) = index else { return };
        #[cfg(feature = "stats")]
        stats::merge_local_into_global();
        self.registry.deregister(index);
        tracing::debug!(index, "thread deregistered");
    }

    pub fn set_handler(&self, handler: Handler) {
        self.with_bound_state(|state| state.set_handler(handler));
    }

    pub fn unset_handler(&self) {
        self.with_bound_state(|state| state.unset_handler());
    }

    /// Checked variant of [`Monitor::set_handler`]: returns
    /// `Err(MonitorError::NotRegistered)` instead of silently no-opping
    /// when the calling thread isn't registered, matching the original's
    /// `bool setHandler` (`include/monitoring.hpp`).
    pub fn try_set_handler(&self, handler: Handler) -> Result<(), MonitorError> {
        self.with_bound_state(|state| state.set_handler(handler))
            .ok_or(MonitorError::NotRegistered)
    }

    /// Checked variant of [`Monitor::unset_handler`].
    pub fn try_unset_handler(&self) -> Result<(), MonitorError> {
        self.with_bound_state(|state| state.unset_handler())
            .ok_or(MonitorError::NotRegistered)
    }

    #[cfg(feature = "mode-active")]
    pub fn start_watchdog(&self, interval: Duration) {
        self.watchdog.start(interval);
    }

    #[cfg(feature = "mode-active")]
    pub fn stop_watchdog(&self) {
        self.watchdog.stop();
    }

    #[cfg(feature = "mode-active")]
    pub fn watchdog_running(&self) -> bool {
        self.watchdog.is_running()
    }

    /// Runs one watchdog scan pass synchronously on the calling thread,
    /// independent of whether a background watchdog is running.
    #[cfg(feature = "mode-active")]
    pub fn scan_once(&self) -> Option<u64> {
        self.watchdog.scan_once()
    }

    #[cfg(feature = "stats")]
    pub fn print_stats(&self) {
        stats::print_stats();
    }

    #[cfg(not(feature = "mode-off"))]
    pub fn expect_progress_in(&self, duration: u64, id: CheckpointId, location: Location) {
        self.with_bound_state(|state| {
            let entry = ALLOCATOR.with(|a| a.borrow_mut().allocate());
            let now = time::now::<U>();
            unsafe {
                (*entry).reinit(time::add(now, duration), id, location, now);
            }
            state.deadlines.push(entry);
        });
    }

    #[cfg(feature = "mode-off")]
    pub fn expect_progress_in(&self, _duration: u64, _id: CheckpointId, _location: Location) {}

    #[cfg(not(feature = "mode-off"))]
    pub fn confirm_progress(&self, location: Location) {
        self.with_bound_state(|state| {
            let now = time::now::<U>();
            let Some(entry_ptr) = state.deadlines.pop() else {
                debug_assert!(false, "confirm_progress called with an empty deadline stack");
                return;
            };
            let entry = unsafe { &*entry_ptr };
            let d = entry.deadline.load(Ordering::Relaxed);
            let mut violated = false;
            if d != 0 {
                let (after, delta) = time::delta_if_after(now, d);
                if after {
                    violated = true;
                    report::self_detected(std::thread::current().id(), delta, location, entry.id.0);
                    state.invoke_handler(entry);
                }
                let _ = entry
                    .deadline
                    .compare_exchange(d, 0, Ordering::AcqRel, Ordering::Relaxed);
            } else {
                // Already claimed: the watchdog won the race and invoked
                // the handler before we got here.
                violated = true;
            }
            #[cfg(feature = "stats")]
            stats::record(entry.id, now.saturating_sub(entry.start), violated);
            #[cfg(not(feature = "stats"))]
            let _ = violated;
            ALLOCATOR.with(|a| a.borrow_mut().deallocate(entry_ptr));
        });
    }

    #[cfg(feature = "mode-off")]
    pub fn confirm_progress(&self, _location: Location) {}
}

impl<const CAP: usize, U: TimeUnit> Default for Monitor<CAP, U> {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII wrapper tying an [`Monitor::expect_progress_in`]/
/// [`Monitor::confirm_progress`] pair to a lexical scope: built in
/// `new`, confirmed on every exit path (normal or unwinding) in `drop`.
pub struct ScopeGuard<'a, const CAP: usize, U: TimeUnit = Nanos> {
    monitor: &'a Monitor<CAP, U>,
    location: Location,
}

impl<'a, const CAP: usize, U: TimeUnit> ScopeGuard<'a, CAP, U> {
    pub fn new(monitor: &'a Monitor<CAP, U>, duration: u64, id: CheckpointId, location: Location) -> Self {
        monitor.expect_progress_in(duration, id, location);
        ScopeGuard { monitor, location }
    }
}

impl<'a, const CAP: usize, U: TimeUnit> Drop for ScopeGuard<'a, CAP, U> {
    fn drop(&mut self) {
        self.monitor.confirm_progress(self.location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Location;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration as StdDuration;

    #[test]
    fn register_deregister_round_trips() {
        let monitor: Monitor<4> = Monitor::new();
        assert!(monitor.try_register_thread().is_ok());
        monitor.deregister_thread();
        // Registering again from the same thread should succeed cleanly.
        assert!(monitor.try_register_thread().is_ok());
        monitor.deregister_thread();
    }

    #[test]
    fn unregistered_thread_operations_are_silent_no_ops() {
        let monitor: Monitor<4> = Monitor::new();
        // No register_thread call: every one of these should be inert.
        monitor.expect_progress_in(1_000_000, CheckpointId(1), Location::UNKNOWN);
        monitor.confirm_progress(Location::UNKNOWN);
    }

    #[test]
    fn try_set_handler_reports_not_registered() {
        let monitor: Monitor<4> = Monitor::new();
        let err = monitor
            .try_set_handler(Arc::new(|_| {}))
            .expect_err("calling thread was never registered");
        assert_eq!(err, MonitorError::NotRegistered);
        assert_eq!(monitor.try_unset_handler(), Err(MonitorError::NotRegistered));

        monitor.try_register_thread().unwrap();
        assert!(monitor.try_set_handler(Arc::new(|_| {})).is_ok());
        assert!(monitor.try_unset_handler().is_ok());
        monitor.deregister_thread();
    }

    #[test]
    fn in_time_confirmation_does_not_invoke_handler() {
        let monitor: Monitor<4> = Monitor::new();
        monitor.try_register_thread().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_handler = Arc::clone(&calls);
        monitor.set_handler(Arc::new(move |_| {
            calls_for_handler.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.expect_progress_in(100_000_000, CheckpointId(1), Location::UNKNOWN);
        thread::sleep(StdDuration::from_millis(5));
        monitor.confirm_progress(Location::UNKNOWN);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        monitor.deregister_thread();
    }

    #[test]
    fn owner_detected_violation_invokes_handler_once() {
        let monitor: Monitor<4> = Monitor::new();
        monitor.try_register_thread().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_handler = Arc::clone(&calls);
        monitor.set_handler(Arc::new(move |_| {
            calls_for_handler.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.expect_progress_in(5_000_000, CheckpointId(1), Location::UNKNOWN);
        thread::sleep(StdDuration::from_millis(30));
        monitor.confirm_progress(Location::UNKNOWN);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        monitor.deregister_thread();
    }

    #[test]
    fn nested_scope_guards_report_only_the_violated_one() {
        let monitor: Monitor<4> = Monitor::new();
        monitor.try_register_thread().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_handler = Arc::clone(&calls);
        monitor.set_handler(Arc::new(move |entry| {
            assert_eq!(entry.id, CheckpointId(2));
            calls_for_handler.fetch_add(1, Ordering::SeqCst);
        }));

        let outer = ScopeGuard::new(&monitor, 1_000_000_000, CheckpointId(1), Location::UNKNOWN);
        let inner = ScopeGuard::new(&monitor, 5_000_000, CheckpointId(2), Location::UNKNOWN);
        thread::sleep(StdDuration::from_millis(30));
        drop(inner);
        drop(outer);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        monitor.deregister_thread();
    }
}
