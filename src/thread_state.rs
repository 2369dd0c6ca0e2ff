//! Per-thread slot record (§C5).

use std::sync::Mutex;
use std::thread::ThreadId;

use crate::entry::CheckpointEntry;
use crate::stack::Stack;

/// A violation handler: reentrant, short, and must not push new
/// expectations while executing (§6).
pub type Handler = std::sync::Arc<dyn Fn(&CheckpointEntry) + Send + Sync>;

struct Rare {
    tid: Option<ThreadId>,
    handler: Option<Handler>,
}

/// One slot in the registry's fixed-size array (§C6). Holds the
/// deadline stack plus the bits that change rarely enough to afford a
/// mutex: the owning thread's id and the handler. The hot path
/// (`expect`/`confirm`) never touches `rare`.
pub struct ThreadState {
    pub(crate) deadlines: Stack,
    pub(crate) index: usize,
    rare: Mutex<Rare>,
}

impl ThreadState {
    pub(crate) fn new(index: usize) -> Self {
        ThreadState {
            deadlines: Stack::new(),
            index,
            rare: Mutex::new(Rare {
                tid: None,
                handler: None,
            }),
        }
    }

    pub(crate) fn bind(&self, tid: ThreadId) {
        self.rare.lock().unwrap().tid = Some(tid);
    }

    pub(crate) fn clear(&self) {
        let mut rare = self.rare.lock().unwrap();
        rare.tid = None;
        rare.handler = None;
    }

    pub fn tid(&self) -> Option<ThreadId> {
        self.rare.lock().unwrap().tid
    }

    pub fn set_handler(&self, handler: Handler) {
        self.rare.lock().unwrap().handler = Some(handler);
    }

    pub fn unset_handler(&self) {
        self.rare.lock().unwrap().handler = None;
    }

    /// Invokes the current handler, if any, under the state's own
    /// mutex. Safe to call from the owning thread or from the watchdog:
    /// whichever wins the CAS on the entry's `deadline` calls this, and
    /// the mutex ensures a concurrent `set_handler` is seen either fully
    /// before or fully after, never torn.
    pub(crate) fn invoke_handler(&self, entry: &CheckpointEntry) {
        let rare = self.rare.lock().unwrap();
        if let Some(handler) = rare.handler.as_ref() {
            let handler = handler.clone();
            drop(rare);
            handler(entry);
        }
    }
}
