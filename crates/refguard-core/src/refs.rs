//! Conventional reference names
//!
//! Trust data lives behind dedicated references so that it travels with the
//! protected content over the same push, pull and clone paths.

/// Active policy state
pub const POLICY_REF: &str = "refs/refguard/policy";

/// Policy state being assembled and signed, not yet applied
pub const POLICY_STAGING_REF: &str = "refs/refguard/policy-staging";

/// Root update still collecting root signatures
pub const ROOT_PROPOSAL_REF: &str = "refs/refguard/root-proposal";

/// Tip of the reference state log
pub const RSL_REF: &str = "refs/refguard/reference-state-log";

const REFGUARD_NAMESPACE: &str = "refs/refguard/";

/// Expand a short branch name (`main`) to `refs/heads/main`
///
/// Names already under `refs/` are returned unchanged.
pub fn absolute_ref_name(name: &str) -> String {
    if name.starts_with("refs/") {
        name.to_string()
    } else {
        format!("refs/heads/{name}")
    }
}

/// Whether `name` belongs to the trust metadata namespace
pub fn is_refguard_ref(name: &str) -> bool {
    name.starts_with(REFGUARD_NAMESPACE)
}
