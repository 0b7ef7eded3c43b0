//! Root of trust
//!
//! Root metadata names the keys allowed to change the root itself and the keys
//! allowed to sign the default policy file. Versions form a chain: version
//! `n + 1` becomes active only with a threshold of signatures from the root
//! keys of version `n`. Version 1 is self-signed.

use refguard_core::{Envelope, KeyId, PublicKey, RefguardError, Result, SigningKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One version of the root metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMetadata {
    /// Monotonic version, starting at 1
    pub version: u64,
    /// Keys that may sign root changes
    pub root_keys: BTreeMap<KeyId, PublicKey>,
    /// Root signatures required to activate a new root
    pub root_threshold: usize,
    /// Keys that may sign the default policy file
    pub policy_keys: BTreeMap<KeyId, PublicKey>,
    /// Policy signatures required for the default policy file
    pub policy_threshold: usize,
}

/// Root metadata with its signatures
pub type SignedRoot = Envelope<RootMetadata>;

fn keyring(keys: impl IntoIterator<Item = PublicKey>) -> BTreeMap<KeyId, PublicKey> {
    keys.into_iter().map(|k| (k.key_id(), k)).collect()
}

fn check_threshold(threshold: usize, key_count: usize) -> Result<()> {
    if threshold < 1 || threshold > key_count {
        return Err(RefguardError::invalid_threshold(threshold, key_count));
    }
    Ok(())
}

impl RootMetadata {
    /// Candidate version 1 over `root_keys`
    ///
    /// No policy keys are trusted yet; the policy threshold starts at 1 and
    /// only becomes meaningful once policy keys are added.
    pub fn initial(root_keys: impl IntoIterator<Item = PublicKey>, threshold: usize) -> Result<Self> {
        let root = Self {
            version: 1,
            root_keys: keyring(root_keys),
            root_threshold: threshold,
            policy_keys: BTreeMap::new(),
            policy_threshold: 1,
        };
        root.validate()?;
        Ok(root)
    }

    /// Threshold sanity checks
    pub fn validate(&self) -> Result<()> {
        check_threshold(self.root_threshold, self.root_keys.len())?;
        if !self.policy_keys.is_empty() {
            check_threshold(self.policy_threshold, self.policy_keys.len())?;
        } else if self.policy_threshold < 1 {
            return Err(RefguardError::invalid_threshold(self.policy_threshold, 0));
        }
        Ok(())
    }

    fn subject(&self) -> String {
        format!("root v{}", self.version)
    }
}

/// An edit to root metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootChange {
    /// Trust a new root key
    AddRootKey(PublicKey),
    /// Stop trusting a root key
    RemoveRootKey(KeyId),
    /// Change the root threshold
    SetRootThreshold(usize),
    /// Trust a new policy key
    AddPolicyKey(PublicKey),
    /// Stop trusting a policy key
    RemovePolicyKey(KeyId),
    /// Change the policy threshold
    SetPolicyThreshold(usize),
}

impl RootChange {
    fn apply(&self, root: &mut RootMetadata) -> Result<()> {
        match self {
            RootChange::AddRootKey(key) => {
                root.root_keys.insert(key.key_id(), key.clone());
            }
            RootChange::RemoveRootKey(id) => {
                root.root_keys
                    .remove(id)
                    .ok_or_else(|| RefguardError::not_found(format!("root key {id}")))?;
            }
            RootChange::SetRootThreshold(threshold) => root.root_threshold = *threshold,
            RootChange::AddPolicyKey(key) => {
                root.policy_keys.insert(key.key_id(), key.clone());
            }
            RootChange::RemovePolicyKey(id) => {
                root.policy_keys
                    .remove(id)
                    .ok_or_else(|| RefguardError::not_found(format!("policy key {id}")))?;
            }
            RootChange::SetPolicyThreshold(threshold) => root.policy_threshold = *threshold,
        }
        Ok(())
    }
}

/// Check that `next` may follow `previous` (or bootstrap when there is none)
pub fn verify_root_transition(previous: Option<&SignedRoot>, next: &SignedRoot) -> Result<()> {
    let candidate = next.payload();
    candidate.validate()?;
    match previous {
        None => {
            if candidate.version != 1 {
                return Err(RefguardError::stale_version(format!(
                    "first root must be version 1, found {}",
                    candidate.version
                )));
            }
            next.verify_threshold(&candidate.subject(), &candidate.root_keys, candidate.root_threshold)?;
        }
        Some(previous) => {
            let active = previous.payload();
            if candidate.version != active.version + 1 {
                return Err(RefguardError::stale_version(format!(
                    "root v{} cannot follow active v{}",
                    candidate.version, active.version
                )));
            }
            next.verify_threshold(&candidate.subject(), &active.root_keys, active.root_threshold)?;
        }
    }
    Ok(())
}

/// Check every transition of a root history, oldest first
pub fn verify_root_chain(history: &[SignedRoot]) -> Result<()> {
    if history.is_empty() {
        return Err(RefguardError::not_found("root of trust"));
    }
    let mut previous = None;
    for root in history {
        verify_root_transition(previous, root)?;
        previous = Some(root);
    }
    Ok(())
}

/// The chain of activated root versions
///
/// The last entry is the active root. Candidates are prepared with
/// [`RootOfTrust::propose_update`], signed with [`RootOfTrust::sign`] and
/// become active through [`RootOfTrust::activate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootOfTrust {
    history: Vec<SignedRoot>,
}

impl RootOfTrust {
    /// Nothing trusted yet
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rebuild from a stored history, checking every transition
    pub fn from_history(history: Vec<SignedRoot>) -> Result<Self> {
        verify_root_chain(&history)?;
        Ok(Self { history })
    }

    /// Active root, if any
    pub fn active(&self) -> Option<&SignedRoot> {
        self.history.last()
    }

    /// Active root metadata, failing when uninitialized
    pub fn current(&self) -> Result<&RootMetadata> {
        self.active()
            .map(Envelope::payload)
            .ok_or_else(|| RefguardError::not_found("root of trust"))
    }

    /// Every activated version, oldest first
    pub fn history(&self) -> &[SignedRoot] {
        &self.history
    }

    /// Consume into the stored history
    pub fn into_history(self) -> Vec<SignedRoot> {
        self.history
    }

    /// Candidate `active.version + 1` with `changes` applied
    pub fn propose_update(&self, changes: &[RootChange]) -> Result<RootMetadata> {
        let mut candidate = self.current()?.clone();
        candidate.version += 1;
        for change in changes {
            change.apply(&mut candidate)?;
        }
        candidate.validate()?;
        Ok(candidate)
    }

    /// Add `key`'s signature to `candidate`
    ///
    /// Only root keys of the active root may sign; before bootstrap, the
    /// candidate's own root keys. Any other key leaves the candidate unchanged.
    pub fn sign(&self, candidate: SignedRoot, key: &SigningKey) -> Result<SignedRoot> {
        let key_id = key.key_id();
        let trusted = match self.active() {
            Some(root) => root.payload().root_keys.contains_key(&key_id),
            None => candidate.payload().root_keys.contains_key(&key_id),
        };
        if !trusted {
            tracing::warn!(
                key_id = %key_id.short(),
                version = candidate.payload().version,
                "key is not a root key, signature not added"
            );
            return Ok(candidate);
        }
        candidate.sign(key)
    }

    /// Make `candidate` the active root
    pub fn activate(&mut self, candidate: SignedRoot) -> Result<()> {
        verify_root_transition(self.active(), &candidate)?;
        tracing::info!(version = candidate.payload().version, "root of trust activated");
        self.history.push(candidate);
        Ok(())
    }
}
