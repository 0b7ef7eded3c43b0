//! Refguard verification
//!
//! Ties the policy store and the reference state log together: applying a
//! policy records it in the log, and verifying a reference replays the log
//! against the policy active at each point.

/// Verifying references
pub mod verifier;
/// Policy and log write paths
pub mod workflow;

pub use refguard_rsl::{Outcome, Violation, ViolationReason};
pub use verifier::Verifier;
pub use workflow::{apply_policy, record_reference};
