//! Refguard policy
//!
//! The trust model for protected references:
//!
//! - **Root of trust**: threshold-signed, version-chained root metadata
//! - **Policy files**: ordered rules with key lists or delegations
//! - **Policy state**: the root history and all files as one stored snapshot
//! - **Evaluation**: first-match, default-deny resolution through delegations
//! - **Store**: staged edits and optimistic promotion to the active state

/// First-match rule resolution and signature checks
pub mod evaluator;
/// Policy files and rules
pub mod file;
/// Namespaced glob patterns and targets
pub mod pattern;
/// Root metadata and its version chain
pub mod root;
/// Stored policy snapshots
pub mod state;
/// Staging and applying policy changes in a repository
pub mod store;

pub use evaluator::{Authorization, Evaluator, Resolution, ResolutionStep};
pub use file::{Authority, PolicyFile, Rule, DEFAULT_POLICY};
pub use pattern::{Namespace, Pattern, Target};
pub use root::{
    verify_root_chain, verify_root_transition, RootChange, RootMetadata, RootOfTrust, SignedRoot,
};
pub use state::{PolicyState, SignedPolicy};
pub use store::{Applied, PolicyStore, RootUpdate};
