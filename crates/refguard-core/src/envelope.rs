//! Signed envelopes and threshold checks
//!
//! An [`Envelope`] pairs a payload with the signatures collected over its
//! canonical bytes. Collecting a signature yields a new envelope; whether the
//! collected set is sufficient is a separate question answered by
//! [`Envelope::verify_threshold`]. Keeping those two steps apart lets callers
//! gather approvals over time and commit them in one transition.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{RefguardError, Result};
use crate::keys::{KeyId, PublicKey, Signature, SigningKey};

/// Canonical signing bytes of a payload
///
/// Payload types keep every map as a `BTreeMap`, so the JSON encoding is
/// deterministic.
pub fn canonical_bytes<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(payload)?)
}

/// A payload with accumulated signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned"))]
pub struct Envelope<T> {
    payload: T,
    #[serde(default)]
    signatures: Vec<Signature>,
}

impl<T: Serialize> Envelope<T> {
    /// Unsigned envelope around `payload`
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            signatures: Vec::new(),
        }
    }

    /// The signed payload
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Unwrap the payload, discarding signatures
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Signatures collected so far, in collection order
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Whether a signature attributed to `key_id` is present (not verified)
    pub fn is_signed_by(&self, key_id: &KeyId) -> bool {
        self.signatures.iter().any(|s| &s.key_id == key_id)
    }

    /// Bytes the signatures cover
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        canonical_bytes(&self.payload)
    }

    /// New envelope carrying one more signature by `key`
    ///
    /// A previous signature from the same key is replaced.
    pub fn sign(self, key: &SigningKey) -> Result<Self> {
        let bytes = self.signing_bytes()?;
        let signature = key.sign(&bytes);
        let mut signatures = self.signatures;
        signatures.retain(|s| s.key_id != signature.key_id);
        signatures.push(signature);
        Ok(Self {
            payload: self.payload,
            signatures,
        })
    }

    /// Same payload with no signatures
    pub fn without_signatures(self) -> Self {
        Self::new(self.payload)
    }

    /// Distinct keys from `trusted` whose signatures verify
    ///
    /// Signatures by unknown keys and invalid signatures are ignored.
    pub fn valid_signers(&self, trusted: &BTreeMap<KeyId, PublicKey>) -> Result<BTreeSet<KeyId>> {
        let bytes = self.signing_bytes()?;
        let mut signers = BTreeSet::new();
        for signature in &self.signatures {
            let Some(public_key) = trusted.get(&signature.key_id) else {
                tracing::trace!(key_id = %signature.key_id.short(), "ignoring signature by untrusted key");
                continue;
            };
            match public_key.verify(&bytes, signature) {
                Ok(()) => {
                    signers.insert(signature.key_id.clone());
                }
                Err(e) => {
                    tracing::debug!(key_id = %signature.key_id.short(), error = %e, "signature failed verification");
                }
            }
        }
        Ok(signers)
    }

    /// Require at least `threshold` distinct valid signatures from `trusted`
    pub fn verify_threshold(
        &self,
        subject: &str,
        trusted: &BTreeMap<KeyId, PublicKey>,
        threshold: usize,
    ) -> Result<BTreeSet<KeyId>> {
        let signers = self.valid_signers(trusted)?;
        if signers.len() < threshold {
            return Err(RefguardError::InsufficientSignatures {
                subject: subject.to_string(),
                have: signers.len(),
                need: threshold,
            });
        }
        tracing::debug!(
            subject,
            signers = signers.len(),
            threshold,
            "threshold satisfied"
        );
        Ok(signers)
    }
}
