//! Refguard reference state log
//!
//! An append-only, hash-chained record of every accepted reference change.
//! Each entry names a reference, the object it now points at and the entry
//! before it. Walking back from the tip must reach genesis without gaps.
//! Comparing two copies of the log exposes rollbacks and forks, and replaying
//! it against the policy recorded alongside shows whether every change was
//! authorized when it was made.

/// Ancestor checks between two copies of the log
pub mod divergence;
/// Entry types
pub mod entry;
/// Loading and appending
pub mod log;
/// Fast-forward push and pull
pub mod remote;
/// Per-reference verification
pub mod replay;

pub use divergence::{detect_divergence, Divergence};
pub use entry::{RslEntry, SignedEntry, StoredEntry};
pub use log::ReferenceStateLog;
pub use remote::{pull, push, SyncReport};
pub use replay::{
    check_change, check_policy_entry, verify_reference, Outcome, Violation, ViolationReason,
};
