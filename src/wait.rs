//! Wait/notify primitive (§4.9).
//!
//! The spec's own primitive is a shared-memory futex word; that syscall
//! binding is explicitly an out-of-scope external collaborator here
//! ("specified only at its interface"). What follows is a portable
//! reference realization of the same contract — `Signal::wait`/`notify`
//! behave like an auto-reset event — built on `Condvar`, used internally
//! by the watchdog so `stop()` can wake it early instead of waiting out
//! a full scan interval.

use std::sync::{Condvar, Mutex};

/// The waiting sentinel. Any other value returned from `wait` is the
/// signal that was notified.
pub const WAITING: u32 = 0;

pub struct Signal {
    state: Mutex<u32>,
    condvar: Condvar,
}

impl Signal {
    pub fn new() -> Self {
        Signal {
            state: Mutex::new(WAITING),
            condvar: Condvar::new(),
        }
    }

    /// ORs `signal` into the shared state and wakes at most one waiter.
    /// `signal` must not be `WAITING`, or the waiter will see no change.
    pub fn notify(&self, signal: u32) {
        debug_assert_ne!(signal, WAITING);
        let mut state = self.state.lock().unwrap();
        *state |= signal;
        self.condvar.notify_one();
    }

    /// Atomically exchanges the state word for `WAITING`; if the
    /// previous value was non-sentinel, returns it immediately,
    /// otherwise sleeps until notified.
    pub fn wait(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        loop {
            if *state != WAITING {
                return std::mem::replace(&mut *state, WAITING);
            }
            state = self.condvar.wait(state).unwrap();
        }
    }

    /// Like [`Signal::wait`], but gives up and returns `WAITING` if
    /// `timeout` elapses first. Used by the watchdog's scan loop so it
    /// can be woken early by `stop()` without busy-polling.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> u32 {
        let mut state = self.state.lock().unwrap();
        loop {
            if *state != WAITING {
                return std::mem::replace(&mut *state, WAITING);
            }
            let (guard, result) = self.condvar.wait_timeout(state, timeout).unwrap();
            state = guard;
            if result.timed_out() {
                return std::mem::replace(&mut *state, WAITING);
            }
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn notify_wakes_waiter_with_signal() {
        let signal = Arc::new(Signal::new());
        let waiter = Arc::clone(&signal);
        let handle = thread::spawn(move || waiter.wait());
        thread::sleep(Duration::from_millis(20));
        signal.notify(7);
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn wait_timeout_returns_waiting_sentinel_on_timeout() {
        let signal = Signal::new();
        assert_eq!(signal.wait_timeout(Duration::from_millis(10)), WAITING);
    }
}
