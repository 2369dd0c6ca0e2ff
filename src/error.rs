//! Recoverable error kinds (§7).
//!
//! Only the outcomes §7 calls recoverable get a typed error. Misuse and
//! allocation failure are irrecoverable by design and abort instead
//! (`debug_assert!`/`process::abort`), matching the original's
//! "undefined in release" contract rather than pretending they can be
//! handled.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MonitorError {
    #[error("thread registry is at capacity")]
    RegistryFull,

    #[error("calling thread is not registered with the monitor")]
    NotRegistered,
}
