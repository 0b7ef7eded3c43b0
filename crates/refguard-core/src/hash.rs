//! Content addressing
//!
//! Objects in the repository backend are keyed by the SHA-256 digest of their
//! bytes. This module is the single place the digest algorithm is chosen.

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::RefguardError;

/// Hash arbitrary bytes to a 32-byte SHA-256 digest
pub fn hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    finish(hasher)
}

/// Hash multiple data chunks as if they were concatenated
pub fn hash_chunks(chunks: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    finish(hasher)
}

fn finish(hasher: Sha256) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

/// Content-addressed object identifier
///
/// Serialized as a lowercase hex string so that stored metadata stays readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Wrap raw digest bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Identifier of the given object bytes
    pub fn for_bytes(data: &[u8]) -> Self {
        Self(hash(data))
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl FromStr for ObjectId {
    type Err = RefguardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| RefguardError::invalid(format!("bad object id '{s}': {e}")))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| RefguardError::invalid(format!("object id '{s}' is not 32 bytes")))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for ObjectId {
    type Error = RefguardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.to_hex()
    }
}
