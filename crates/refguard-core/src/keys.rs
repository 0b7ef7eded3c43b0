//! Keys, fingerprints and signatures
//!
//! Metadata only ever stores [`PublicKey`]s and their [`KeyId`] fingerprints.
//! Signing keys stay with the actor that owns them. Verification dispatches on
//! [`KeyType`] so that further key schemes slot in without touching callers.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{RefguardError, Result};
use crate::hash;

/// Hex encoding for byte fields in stored metadata
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Supported signature schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Ed25519 (RFC 8032)
    Ed25519,
}

impl KeyType {
    /// Stable tag used in fingerprints and textual key encodings
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ed25519 => "ed25519",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable fingerprint of a public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Wrap an existing fingerprint string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fingerprint as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated fingerprint for log lines
    ///
    /// Ids read from signatures are untrusted, so the cut is made on a
    /// character boundary.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public verification key
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    key_type: KeyType,
    #[serde(with = "hex_bytes")]
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Build an Ed25519 public key, rejecting bytes that are not a curve point
    pub fn ed25519(bytes: [u8; 32]) -> Result<Self> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|e| RefguardError::crypto(format!("invalid ed25519 public key: {e}")))?;
        Ok(Self {
            key_type: KeyType::Ed25519,
            bytes: bytes.to_vec(),
        })
    }

    /// Scheme of this key
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Raw public key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Fingerprint: hex SHA-256 over the scheme tag and the key bytes
    pub fn key_id(&self) -> KeyId {
        let digest = hash::hash_chunks(&[self.key_type.as_str().as_bytes(), b":", &self.bytes]);
        KeyId(hex::encode(digest))
    }

    /// Verify `signature` over `payload`
    pub fn verify(&self, payload: &[u8], signature: &Signature) -> Result<()> {
        if signature.key_id != self.key_id() {
            return Err(RefguardError::crypto(format!(
                "signature by {} checked against key {}",
                signature.key_id.short(),
                self.key_id().short()
            )));
        }
        match self.key_type {
            KeyType::Ed25519 => {
                let key_bytes: [u8; 32] = self
                    .bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| RefguardError::crypto("ed25519 public key is not 32 bytes"))?;
                let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
                    .map_err(|e| RefguardError::crypto(e.to_string()))?;
                let sig = ed25519_dalek::Signature::from_slice(&signature.bytes)
                    .map_err(|e| RefguardError::crypto(format!("malformed signature: {e}")))?;
                verifying_key
                    .verify(payload, &sig)
                    .map_err(|e| RefguardError::crypto(format!("signature invalid: {e}")))
            }
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("key_type", &self.key_type)
            .field("key_id", &self.key_id().short())
            .finish()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key_type, hex::encode(&self.bytes))
    }
}

impl FromStr for PublicKey {
    type Err = RefguardError;

    /// Accepts `ed25519:<hex>` or bare hex (Ed25519 assumed)
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let encoded = match s.split_once(':') {
            Some(("ed25519", rest)) => rest,
            Some((scheme, _)) => {
                return Err(RefguardError::invalid(format!("unsupported key type '{scheme}'")))
            }
            None => s,
        };
        let bytes = hex::decode(encoded)
            .map_err(|e| RefguardError::invalid(format!("bad public key encoding: {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RefguardError::invalid("ed25519 public key must be 32 bytes"))?;
        Self::ed25519(bytes)
    }
}

/// A signature attributed to a key fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Fingerprint of the signing key
    pub key_id: KeyId,
    /// Raw signature bytes
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
}

/// Private signing key held by an actor
#[derive(Clone)]
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    /// Deterministic key from a 32-byte seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    /// Fresh random key from the operating system RNG
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut rng),
        }
    }

    /// Parse a hex-encoded seed (the on-disk private key format)
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| RefguardError::invalid(format!("bad signing key encoding: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RefguardError::invalid("signing key seed must be 32 bytes"))?;
        Ok(Self::from_seed(seed))
    }

    /// Hex-encoded seed
    ///
    /// Handle with care - this is secret key material.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.to_bytes())
    }

    /// Matching public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key_type: KeyType::Ed25519,
            bytes: self.inner.verifying_key().to_bytes().to_vec(),
        }
    }

    /// Fingerprint of the matching public key
    pub fn key_id(&self) -> KeyId {
        self.public_key().key_id()
    }

    /// Sign `payload`
    pub fn sign(&self, payload: &[u8]) -> Signature {
        Signature {
            key_id: self.key_id(),
            bytes: self.inner.sign(payload).to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("secret", &"[REDACTED]")
            .field("key_id", &self.key_id().short())
            .finish()
    }
}
