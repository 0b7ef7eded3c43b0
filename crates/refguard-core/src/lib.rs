//! Refguard core
//!
//! Shared foundations for the trust engine:
//!
//! - **Keys and signatures**: fingerprints, Ed25519 signing and verification
//! - **Envelopes**: payloads with accumulated signatures and threshold checks
//! - **Content addressing**: SHA-256 object ids
//! - **Backends**: object and reference stores the engine reads and writes
//! - **Transport**: object-first synchronization between repository copies
//! - **Commits**: minimal signed-commit plumbing

/// Repository backend traits and implementations
pub mod backend;
/// Signed commit model
pub mod commit;
/// Signed payloads and threshold verification
pub mod envelope;
/// Unified error type
pub mod errors;
/// Content hashing and object ids
pub mod hash;
/// Public keys, signing keys, fingerprints
pub mod keys;
/// Conventional reference names
pub mod refs;
/// Repository synchronization
pub mod transport;

pub use backend::{
    FsRepository, MemoryRepository, ObjectStore, ObjectStoreExt, RefStore, Repository,
};
pub use commit::{changed_paths, commit_files, Commit, SignedCommit};
pub use envelope::{canonical_bytes, Envelope};
pub use errors::{RefguardError, Result};
pub use hash::ObjectId;
pub use keys::{KeyId, KeyType, PublicKey, Signature, SigningKey};
pub use refs::{
    absolute_ref_name, is_refguard_ref, POLICY_REF, POLICY_STAGING_REF, ROOT_PROPOSAL_REF, RSL_REF,
};
