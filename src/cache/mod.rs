//! Bounded weak/strong reference cache (§C10).
//!
//! A secondary, loosely-coupled core: capacity-bounded pool of control
//! blocks whose claim/reclaim/refcount transitions are coordinated with
//! the same atomic-state-machine discipline as the deadline stack, but
//! otherwise independent of it.

mod cache;
mod control_block;
mod queue;
mod strong_ref;
mod weak_ref;

pub use cache::Cache;
pub use strong_ref::StrongRef;
pub use weak_ref::WeakRef;
