//! Diagnostic output (§6). Line-oriented and stable for scraping; the
//! exact text is matched by `print_stats`/handler consumers that grep
//! log output, so the message format is not a free-standing choice.

use crate::entry::{CheckpointEntry, Location};
use std::thread::ThreadId;

/// Emitted when the confirming thread itself observes `now > deadline`
/// before claiming it.
pub(crate) fn self_detected(tid: ThreadId, delta: u64, location: Location, id: u64) {
    if id != 0 {
        tracing::warn!(
            tid = ?tid,
            delta,
            file = location.file,
            line = location.line,
            function = location.function,
            checkpoint_id = id,
            "[This thread] tid {:?} deadline exceeded by {} time units at CONFIRM PROGRESS in {} [checkpoint id {}]",
            tid, delta, location, id
        );
    } else {
        tracing::warn!(
            tid = ?tid,
            delta,
            file = location.file,
            line = location.line,
            function = location.function,
            "[This thread] tid {:?} deadline exceeded by {} time units at CONFIRM PROGRESS in {}",
            tid, delta, location
        );
    }
}

/// Emitted when the watchdog wins the CAS race on a violated entry.
pub(crate) fn watchdog_detected(delta: u64, entry: &CheckpointEntry) {
    let location = entry.location;
    let id = entry.id.0;
    if id != 0 {
        tracing::warn!(
            delta,
            file = location.file,
            line = location.line,
            function = location.function,
            checkpoint_id = id,
            "[Monitoring thread] deadline exceeded by at least {} time units at {} [checkpoint id {}]",
            delta, location, id
        );
    } else {
        tracing::warn!(
            delta,
            file = location.file,
            line = location.line,
            function = location.function,
            "[Monitoring thread] deadline exceeded by at least {} time units at {}",
            delta, location
        );
    }
}
