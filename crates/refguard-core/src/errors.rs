//! Unified error system for Refguard
//!
//! Every crate in the workspace reports failures through [`RefguardError`]. The
//! first group of variants is the trust/policy taxonomy; each one is terminal
//! for the operation that raised it and is never retried here. The remaining
//! variants cover storage, encoding and crypto plumbing.

use serde::{Deserialize, Serialize};

/// Unified error type for all Refguard operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RefguardError {
    /// Threshold is zero or exceeds the number of keys it ranges over
    #[error("Invalid threshold: {threshold} of {key_count} keys")]
    InvalidThreshold {
        /// Requested threshold
        threshold: usize,
        /// Number of keys the threshold applies to
        key_count: usize,
    },

    /// Fewer distinct valid signatures than the threshold requires
    #[error("Insufficient signatures for {subject}: have {have}, need {need}")]
    InsufficientSignatures {
        /// What was being activated (root version, policy file name)
        subject: String,
        /// Distinct valid trusted signatures present
        have: usize,
        /// Required threshold
        need: usize,
    },

    /// A newer version became active since the candidate was prepared
    #[error("Stale version: {message}")]
    StaleVersion {
        /// Description of the version mismatch
        message: String,
    },

    /// Key is not allowed to sign the given metadata
    #[error("Unauthorized signer {key_id} for {subject}")]
    UnauthorizedSigner {
        /// Fingerprint of the rejected key
        key_id: String,
        /// Metadata the key tried to sign
        subject: String,
    },

    /// A rule with this name already exists in the file
    #[error("Duplicate rule name '{rule}' in policy '{policy}'")]
    DuplicateRuleName {
        /// Policy file name
        policy: String,
        /// Offending rule name
        rule: String,
    },

    /// No rule pattern matched the target
    #[error("No matching rule for {target}")]
    NoMatchingRule {
        /// Target that was resolved
        target: String,
    },

    /// The change is not signed by any authorized key
    #[error("Unauthorized change to {target}: {reason}")]
    Unauthorized {
        /// Target that was evaluated
        target: String,
        /// Why authorization failed
        reason: String,
    },

    /// Delegations loop back into a file already being evaluated
    #[error("Delegation cycle through policy '{policy}'")]
    DelegationCycle {
        /// Policy file that was reached twice
        policy: String,
    },

    /// Append was attempted on top of an entry that is not the current tip
    #[error("Fork detected: expected tip {expected}, found {actual}")]
    ForkDetected {
        /// Entry the caller believed to be the tip
        expected: String,
        /// Actual tip of the log
        actual: String,
    },

    /// Neither log tip is an ancestor of the other
    #[error("History diverged: local tip {local} and remote tip {remote} share no linear history")]
    HistoryDiverged {
        /// Local tip entry id
        local: String,
        /// Remote tip entry id
        remote: String,
    },

    /// Hash chain of the reference state log is broken
    #[error("Reference state log chain broken: {message}")]
    ChainBroken {
        /// Description of the break
        message: String,
    },

    /// Compare-and-swap on a reference lost the race
    #[error("Reference {reference} moved: expected {expected}, found {actual}")]
    RefConflict {
        /// Reference name
        reference: String,
        /// Expected value (or "none")
        expected: String,
        /// Actual value (or "none")
        actual: String,
    },

    /// Requested object, reference or rule does not exist
    #[error("Not found: {message}")]
    NotFound {
        /// What was not found
        message: String,
    },

    /// Cryptographic operation failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Error message describing the cryptographic failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Storage operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Invalid input
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },
}

impl RefguardError {
    /// Create an invalid threshold error
    pub fn invalid_threshold(threshold: usize, key_count: usize) -> Self {
        Self::InvalidThreshold {
            threshold,
            key_count,
        }
    }

    /// Create a stale version error
    pub fn stale_version(message: impl Into<String>) -> Self {
        Self::StaleVersion {
            message: message.into(),
        }
    }

    /// Create a chain broken error
    pub fn chain_broken(message: impl Into<String>) -> Self {
        Self::ChainBroken {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// True for failures of the storage/transport collaborator rather than
    /// of the trust data itself.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::RefConflict { .. } | Self::Storage { .. })
    }
}

impl From<serde_json::Error> for RefguardError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for RefguardError {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}

/// Standard Result type for Refguard operations
pub type Result<T> = std::result::Result<T, RefguardError>;
