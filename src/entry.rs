//! Checkpoint entries: the stack payload (§C2).

use std::sync::atomic::AtomicU64;

/// Opaque checkpoint identifier. `0` is reserved for "unnamed".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CheckpointId(pub u64);

impl CheckpointId {
    /// The reserved "unnamed" id.
    pub const UNNAMED: CheckpointId = CheckpointId(0);
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::UNNAMED
    }
}

/// A source-code tag, written once at `expect_progress_in` and read by
/// both the owning thread and the watchdog. Plain data: `&'static str`
/// and a line number, cheap enough to copy that there is no reason to
/// intern it.
#[derive(Clone, Copy, Debug, Default)]
pub struct Location {
    pub file: &'static str,
    pub line: u32,
    pub function: &'static str,
}

impl Location {
    pub const UNKNOWN: Location = Location {
        file: "<unknown>",
        line: 0,
        function: "<unknown>",
    };
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "file {} line {} function {}",
            self.file, self.line, self.function
        )
    }
}

/// Captures the call site of an `expect_progress_in`/`confirm_progress`
/// pair. Built by the `CURRENT_LOCATION!()` macro below.
#[macro_export]
macro_rules! current_location {
    () => {
        $crate::Location {
            file: file!(),
            line: line!(),
            function: {
                fn f() {}
                fn type_name_of<T>(_: T) -> &'static str {
                    std::any::type_name::<T>()
                }
                let name = type_name_of(f);
                &name[..name.len() - 3]
            },
        }
    };
}

/// One outstanding `expect_progress_in` call.
///
/// Every field but `deadline` is written once, at push, and never
/// mutated again while the entry is live on the stack (only `deadline`
/// is claimable via CAS by either the owner or the watchdog). This is
/// what makes it safe for a reader to walk the stack and dereference
/// entries without taking a lock: it is only racing on one word.
///
/// `next` is a plain raw pointer rather than an atomic one: it is set
/// once, before the entry is published through the stack's `top`
/// (itself a `Release` store), so any reader that acquires `top` has
/// already synchronized-with that write transitively through the chain
/// of prior pushes.
pub struct CheckpointEntry {
    pub(crate) deadline: AtomicU64,
    pub id: CheckpointId,
    pub location: Location,
    pub start: u64,
    pub(crate) sequence: u64,
    pub(crate) next: *mut CheckpointEntry,
}

// SAFETY: entries are only ever shared across threads through the
// deadline stack's synchronization (count-gated acquire/release on
// `top`), never moved, and mutated post-publication only through the
// atomic `deadline` field.
unsafe impl Send for CheckpointEntry {}
unsafe impl Sync for CheckpointEntry {}

impl Default for CheckpointEntry {
    fn default() -> Self {
        CheckpointEntry {
            deadline: AtomicU64::new(0),
            id: CheckpointId::UNNAMED,
            location: Location::UNKNOWN,
            start: 0,
            sequence: 0,
            next: std::ptr::null_mut(),
        }
    }
}

impl CheckpointEntry {
    /// Re-initializes a recycled entry for a new `expect_progress_in`.
    pub(crate) fn reinit(&mut self, deadline: u64, id: CheckpointId, location: Location, start: u64) {
        *self.deadline.get_mut() = deadline;
        self.id = id;
        self.location = location;
        self.start = start;
        self.sequence = 0;
        self.next = std::ptr::null_mut();
    }
}

/// A bulk-copied, private snapshot of a [`CheckpointEntry`], produced by
/// the "peek" reader pattern in `Stack::peek` (§4.2).
#[derive(Clone, Copy, Debug)]
pub struct CheckpointSnapshot {
    pub deadline: u64,
    pub id: CheckpointId,
    pub location: Location,
    pub start: u64,
    pub sequence: u64,
}
