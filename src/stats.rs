//! Per-checkpoint latency statistics (§C9).
//!
//! Per spec: "alternative is a per-thread mapping merged on deregister
//! (preferred for throughput)". Updates during normal operation hit
//! only a thread-local map; the global, mutex-guarded map is touched
//! once per thread, at deregistration, when the local map is merged in.
//! `print_stats`/`snapshot` only ever read the merged global map, so a
//! thread's in-flight stats are not visible globally until it
//! deregisters — a throughput/visibility tradeoff made explicitly in
//! `DESIGN.md`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::entry::CheckpointId;

/// Aggregated statistics for one checkpoint id.
#[derive(Clone, Copy, Debug)]
pub struct CheckpointStats {
    pub count: u64,
    pub violations: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    mean_of_squares: f64,
}

impl Default for CheckpointStats {
    fn default() -> Self {
        CheckpointStats {
            count: 0,
            violations: 0,
            min: u64::MAX,
            max: 0,
            mean: 0.0,
            mean_of_squares: 0.0,
        }
    }
}

impl CheckpointStats {
    /// Incrementally folds one observation in, following the original's
    /// `stats_monitor::update` formulas exactly.
    fn update(&mut self, runtime: u64, violated: bool) {
        if violated {
            self.violations += 1;
        }
        self.count += 1;
        self.min = self.min.min(runtime);
        self.max = self.max.max(runtime);

        let t = runtime as f64;
        let n = self.count as f64;
        let m1 = self.mean;
        self.mean = (t + (n - 1.0) * m1) / n;

        let m2 = self.mean_of_squares;
        self.mean_of_squares = (t * t + (n - 1.0) * m2) / n;
    }

    /// `(n/(n-1)) * (E[X^2] - E[X]^2)`, the bias-corrected variance
    /// estimate from §4.7. Zero until at least two observations exist.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        (n / (n - 1.0)) * (self.mean_of_squares - self.mean * self.mean)
    }

    fn merge(&self, other: &CheckpointStats) -> CheckpointStats {
        if self.count == 0 {
            return *other;
        }
        if other.count == 0 {
            return *self;
        }
        let n = self.count + other.count;
        let wa = self.count as f64;
        let wb = other.count as f64;
        CheckpointStats {
            count: n,
            violations: self.violations + other.violations,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            mean: (self.mean * wa + other.mean * wb) / n as f64,
            mean_of_squares: (self.mean_of_squares * wa + other.mean_of_squares * wb) / n as f64,
        }
    }
}

thread_local! {
    static LOCAL: RefCell<HashMap<CheckpointId, CheckpointStats>> = RefCell::new(HashMap::new());
}

static GLOBAL: OnceLock<Mutex<HashMap<CheckpointId, CheckpointStats>>> = OnceLock::new();

fn global() -> &'static Mutex<HashMap<CheckpointId, CheckpointStats>> {
    GLOBAL.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Folds one observation into the calling thread's local map. Called by
/// `confirm_progress`; never blocks.
pub fn record(id: CheckpointId, runtime: u64, violated: bool) {
    LOCAL.with(|local| {
        local.borrow_mut().entry(id).or_default().update(runtime, violated);
    });
}

/// Merges the calling thread's local stats into the global map and
/// clears the local map. Called from `deregister_thread`.
pub fn merge_local_into_global() {
    LOCAL.with(|local| {
        let mut local = local.borrow_mut();
        if local.is_empty() {
            return;
        }
        let mut global = global().lock().unwrap();
        for (id, stats) in local.drain() {
            let merged = global.get(&id).map(|g| g.merge(&stats)).unwrap_or(stats);
            global.insert(id, merged);
        }
    });
}

/// A snapshot of the globally merged statistics for one checkpoint id.
pub fn get(id: CheckpointId) -> Option<CheckpointStats> {
    global().lock().unwrap().get(&id).copied()
}

/// A snapshot of the entire globally merged statistics map.
pub fn snapshot() -> HashMap<CheckpointId, CheckpointStats> {
    global().lock().unwrap().clone()
}

/// Logs every checkpoint's aggregated statistics. The only reader is
/// print-on-shutdown tooling; this does not clear the map.
pub fn print_stats() {
    let stats = snapshot();
    for (id, s) in stats {
        tracing::info!(
            checkpoint_id = id.0,
            count = s.count,
            violations = s.violations,
            min = s.min,
            max = s.max,
            mean = s.mean,
            stddev = s.variance().sqrt(),
            "checkpoint statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_laws_hold() {
        let mut s = CheckpointStats::default();
        s.update(10, false);
        s.update(20, false);
        s.update(30, true);
        assert_eq!(s.count, 3);
        assert_eq!(s.violations, 1);
        assert_eq!(s.min, 10);
        assert_eq!(s.max, 30);
        assert!((s.mean - 20.0).abs() < 1e-9);
    }

    #[test]
    fn merge_combines_disjoint_threads() {
        let mut a = CheckpointStats::default();
        a.update(10, false);
        a.update(20, false);
        let mut b = CheckpointStats::default();
        b.update(30, false);
        let merged = a.merge(&b);
        assert_eq!(merged.count, 3);
        assert!((merged.mean - 20.0).abs() < 1e-9);
        assert_eq!(merged.min, 10);
        assert_eq!(merged.max, 30);
    }

    #[test]
    fn variance_is_zero_below_two_samples() {
        let mut s = CheckpointStats::default();
        s.update(10, false);
        assert_eq!(s.variance(), 0.0);
    }
}
