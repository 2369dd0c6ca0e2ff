//! Monotonic time base and overflow-safe deadline arithmetic.
//!
//! All deadlines are absolute values of a 64-bit monotonic counter. Two
//! times are compared via signed difference rather than a plain `>`, so
//! comparisons remain correct across wraparound as long as the active
//! window between any two compared values stays under 2^63.

use std::sync::OnceLock;
use std::time::Instant;

/// A unit of measure for the monitor's absolute time values.
///
/// This is a compile-time choice (a zero-sized marker type), not a
/// runtime one: the rest of the system is generic over `U: TimeUnit`
/// and never hard-codes a scale.
pub trait TimeUnit: Copy + Send + Sync + 'static {
    /// Scale a nanosecond count down to this unit.
    fn scale_nanos(nanos: u64) -> u64;
}

/// Nanosecond resolution (the default, matching the original's `types.hpp`).
#[derive(Clone, Copy, Debug, Default)]
pub struct Nanos;

impl TimeUnit for Nanos {
    #[inline]
    fn scale_nanos(nanos: u64) -> u64 {
        nanos
    }
}

/// Microsecond resolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct Micros;

impl TimeUnit for Micros {
    #[inline]
    fn scale_nanos(nanos: u64) -> u64 {
        nanos / 1_000
    }
}

/// Millisecond resolution (matches the original's `time.hpp`, which used
/// `std::chrono::milliseconds` for the simpler single-file variant).
#[derive(Clone, Copy, Debug, Default)]
pub struct Millis;

impl TimeUnit for Millis {
    #[inline]
    fn scale_nanos(nanos: u64) -> u64 {
        nanos / 1_000_000
    }
}

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Reads the monotonic clock, coerced to `U`.
#[inline]
pub fn now<U: TimeUnit>() -> u64 {
    let nanos = Instant::now().duration_since(epoch()).as_nanos() as u64;
    U::scale_nanos(nanos)
}

/// Absolute-time arithmetic with wraparound: `deadline + duration`.
#[inline]
pub fn add(deadline: u64, duration: u64) -> u64 {
    deadline.wrapping_add(duration)
}

/// `true` iff `a` is after `b`, tolerating unsigned wraparound.
#[inline]
pub fn is_after(a: u64, b: u64) -> bool {
    (a.wrapping_sub(b) as i64) > 0
}

/// Fused "was `a` after `b`" plus the unsigned delta `a - b`.
///
/// This is the hot-path primitive: every deadline check in the crate
/// goes through this function instead of calling `is_after` and then
/// recomputing the delta.
#[inline]
pub fn delta_if_after(a: u64, b: u64) -> (bool, u64) {
    let delta = a.wrapping_sub(b);
    (delta as i64 > 0, delta)
}
