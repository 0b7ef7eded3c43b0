//! Signed commit plumbing
//!
//! Just enough of a commit model to drive the trust engine without an external
//! version-control binary: a commit is a path snapshot plus parents and a
//! message, wrapped in an [`Envelope`] whose signatures identify its author.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::backend::{ObjectStoreExt, Repository};
use crate::envelope::Envelope;
use crate::errors::Result;
use crate::hash::ObjectId;
use crate::keys::SigningKey;

/// Commit payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Parent commits (empty for a root commit)
    pub parents: Vec<ObjectId>,
    /// Repository-relative path to blob id
    pub tree: BTreeMap<String, ObjectId>,
    /// Commit message
    pub message: String,
}

/// A commit together with its author signatures
pub type SignedCommit = Envelope<Commit>;

impl Commit {
    /// Load a signed commit object
    pub fn load<R: Repository + ?Sized>(repo: &R, id: &ObjectId) -> Result<SignedCommit> {
        repo.get_json(id)
    }
}

/// Paths whose content differs between two snapshots (added, removed or modified)
pub fn changed_paths(
    before: &BTreeMap<String, ObjectId>,
    after: &BTreeMap<String, ObjectId>,
) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();
    for (path, id) in after {
        if before.get(path) != Some(id) {
            changed.insert(path.clone());
        }
    }
    for path in before.keys() {
        if !after.contains_key(path) {
            changed.insert(path.clone());
        }
    }
    changed
}

/// Write `files` as blobs on top of the snapshot at `reference`, sign a commit
/// with `key`, and advance `reference` to it (compare-and-swap).
///
/// `files` maps a path to new content; `None` removes the path.
pub fn commit_files<R: Repository + ?Sized>(
    repo: &R,
    reference: &str,
    files: &BTreeMap<String, Option<Vec<u8>>>,
    message: &str,
    key: &SigningKey,
) -> Result<ObjectId> {
    let parent = repo.read_ref(reference)?;
    let mut tree = match parent {
        Some(id) => Commit::load(repo, &id)?.into_payload().tree,
        None => BTreeMap::new(),
    };
    for (path, content) in files {
        match content {
            Some(bytes) => {
                let blob = repo.put_object(bytes)?;
                tree.insert(path.clone(), blob);
            }
            None => {
                tree.remove(path);
            }
        }
    }

    let commit = Commit {
        parents: parent.into_iter().collect(),
        tree,
        message: message.to_string(),
    };
    let signed = Envelope::new(commit).sign(key)?;
    let id = repo.put_json(&signed)?;
    repo.update_ref(reference, id, parent)?;
    tracing::info!(
        reference,
        commit = %id.short(),
        signer = %key.key_id().short(),
        "created signed commit"
    );
    Ok(id)
}
