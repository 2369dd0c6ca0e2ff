//! The watchdog (§C7): a periodic scanner thread, independent of the
//! threads it monitors.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::registry::ThreadRegistry;
use crate::report;
use crate::time::{self, Nanos};
use crate::wait::Signal;

const MIN_INTERVAL: Duration = Duration::from_micros(100);

/// A running (or stopped) watchdog bound to one registry.
pub struct Watchdog<const CAP: usize> {
    registry: Arc<ThreadRegistry<CAP>>,
    running: Arc<AtomicBool>,
    signal: Arc<Signal>,
    handle: Mutex<Option<JoinHandle<()>>>,
    interval_nanos: Arc<AtomicU64>,
}

impl<const CAP: usize> Watchdog<CAP> {
    pub fn new(registry: Arc<ThreadRegistry<CAP>>) -> Self {
        Watchdog {
            registry,
            running: Arc::new(AtomicBool::new(false)),
            signal: Arc::new(Signal::new()),
            handle: Mutex::new(None),
            interval_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one scan pass synchronously, outside of any background
    /// thread, and returns the soonest still-armed deadline observed.
    /// Useful for callers driving their own scan cadence, and for
    /// benchmarking the per-stack walk in isolation.
    pub fn scan_once(&self) -> Option<u64> {
        check_all(&self.registry, time::now::<Nanos>())
    }

    /// Spawns the scanner thread. Idempotent: a second `start` while
    /// already running is a no-op.
    pub fn start(&self, interval: Duration) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.interval_nanos
            .store(interval.as_nanos() as u64, Ordering::Relaxed);

        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&self.running);
        let signal = Arc::clone(&self.signal);
        let interval_nanos = Arc::clone(&self.interval_nanos);

        let builder = std::thread::Builder::new().name("progress-monitor-watchdog".into());
        let handle = builder
            .spawn(move || {
                raise_priority_best_effort();
                scan_loop(registry, running, signal, interval_nanos);
            })
            .expect("failed to spawn watchdog thread");
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Sets the stop flag, wakes the scanner early, and joins it. At
    /// most one scan interval elapses after this call starts.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.signal.notify(1);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl<const CAP: usize> Drop for Watchdog<CAP> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn scan_loop<const CAP: usize>(
    registry: Arc<ThreadRegistry<CAP>>,
    running: Arc<AtomicBool>,
    signal: Arc<Signal>,
    interval_nanos: Arc<AtomicU64>,
) {
    while running.load(Ordering::Acquire) {
        let scan_started = Instant::now();
        let now = time::now::<Nanos>();
        let soonest = check_all(&registry, now);

        let configured = Duration::from_nanos(interval_nanos.load(Ordering::Relaxed));
        let sleep_for = adaptive_sleep(configured, soonest, now);
        let elapsed = scan_started.elapsed();
        let remaining = sleep_for.saturating_sub(elapsed);
        if remaining.is_zero() {
            continue;
        }
        signal.wait_timeout(remaining);
    }
}

/// Scans every registered thread's deadline stack once. Returns the
/// soonest still-armed deadline observed, if any, to drive the
/// adaptive interval (§4.6, a quality improvement, not a correctness
/// requirement).
fn check_all<const CAP: usize>(registry: &ThreadRegistry<CAP>, now: u64) -> Option<u64> {
    let mut soonest: Option<u64> = None;
    registry.for_each_registered(|state| {
        state.deadlines.scan_and_claim(now, |entry, delta| {
            report::watchdog_detected(delta, entry);
            state.invoke_handler(entry);
        });
        // A second light pass to track the soonest deadline for the
        // adaptive sleep; uses the same count-gated peek as any other
        // reader, never claims anything.
        if let Some(snapshot) = state.deadlines.peek() {
            if snapshot.deadline != 0 {
                soonest = Some(match soonest {
                    Some(current) => current.min(snapshot.deadline),
                    None => snapshot.deadline,
                });
            }
        }
    });
    soonest
}

fn adaptive_sleep(configured: Duration, soonest: Option<u64>, now: u64) -> Duration {
    let Some(deadline) = soonest else {
        return configured;
    };
    if !time::is_after(deadline, now) {
        return MIN_INTERVAL;
    }
    let remaining = Duration::from_nanos(deadline.saturating_sub(now));
    remaining.clamp(MIN_INTERVAL, configured)
}

#[cfg(unix)]
fn raise_priority_best_effort() {
    unsafe {
        let policy = libc::SCHED_FIFO;
        let max_priority = libc::sched_get_priority_max(policy);
        if max_priority < 0 {
            tracing::warn!("could not query max SCHED_FIFO priority for watchdog thread");
            return;
        }
        let params = libc::sched_param {
            sched_priority: max_priority,
        };
        let result = libc::pthread_setschedparam(libc::pthread_self(), policy, &params);
        if result != 0 {
            tracing::warn!(
                errno = result,
                "could not raise watchdog thread priority, continuing at normal priority"
            );
        }
    }
}

#[cfg(not(unix))]
fn raise_priority_best_effort() {
    tracing::warn!("priority raise for watchdog thread is not supported on this platform");
}
