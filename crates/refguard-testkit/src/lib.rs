//! Test fixtures for Refguard
//!
//! Keys are derived from actor names so every test run sees the same
//! fingerprints, and key files can be written for CLI-level tests.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use refguard_core::{commit_files, hash, ObjectId, Repository, SigningKey};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Deterministic signing key for a named actor
pub fn key(name: &str) -> SigningKey {
    SigningKey::from_seed(hash::hash_chunks(&[b"refguard-testkit:", name.as_bytes()]))
}

/// The cast of the end-to-end scenarios
#[derive(Debug, Clone)]
pub struct Actors {
    /// Root-of-trust key
    pub root: SigningKey,
    /// Policy key used when a single policy signer suffices
    pub targets: SigningKey,
    /// First developer
    pub developer1: SigningKey,
    /// Second developer
    pub developer2: SigningKey,
    /// Third developer
    pub developer3: SigningKey,
    /// Key authorized for protected branches
    pub authorized: SigningKey,
    /// Key never authorized anywhere
    pub unauthorized: SigningKey,
}

impl Actors {
    /// Deterministic keys for every actor
    pub fn new() -> Self {
        Self {
            root: key("root"),
            targets: key("targets"),
            developer1: key("developer1"),
            developer2: key("developer2"),
            developer3: key("developer3"),
            authorized: key("authorized"),
            unauthorized: key("unauthorized"),
        }
    }
}

impl Default for Actors {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `<dir>/<name>` (hex seed) and `<dir>/<name>.pub` (public key)
pub fn write_key_files(dir: &Path, name: &str) -> (PathBuf, PathBuf) {
    let signing = key(name);
    let private_path = dir.join(name);
    let public_path = dir.join(format!("{name}.pub"));
    std::fs::write(&private_path, signing.to_hex()).expect("write private key");
    std::fs::write(&public_path, signing.public_key().to_string()).expect("write public key");
    (private_path, public_path)
}

/// Commit a single file change to `reference`, signed by `key`
pub fn commit_file<R: Repository + ?Sized>(
    repo: &R,
    reference: &str,
    path: &str,
    content: &str,
    key: &SigningKey,
) -> ObjectId {
    let mut files = BTreeMap::new();
    files.insert(path.to_string(), Some(content.as_bytes().to_vec()));
    commit_files(repo, reference, &files, content, key).expect("commit")
}

/// Install a test subscriber honoring `RUST_LOG` (safe to call repeatedly)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
