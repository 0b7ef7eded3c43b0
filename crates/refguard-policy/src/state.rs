//! Policy state snapshots
//!
//! A [`PolicyState`] bundles the root history with every signed policy file.
//! States are stored as content-addressed objects; the active one is named by
//! [`POLICY_REF`](refguard_core::POLICY_REF). Each state records the state it
//! was derived from so a staged state can be recognised as stale.

use refguard_core::{
    Envelope, KeyId, ObjectId, ObjectStoreExt, PublicKey, RefguardError, Repository, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::file::{Authority, PolicyFile, DEFAULT_POLICY};
use crate::root::{verify_root_chain, RootMetadata, RootOfTrust, SignedRoot};

/// A policy file with its signatures
pub type SignedPolicy = Envelope<PolicyFile>;

/// Root history plus policy files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyState {
    /// Activated root versions, oldest first
    pub roots: Vec<SignedRoot>,
    /// Policy files by name
    #[serde(default)]
    pub files: BTreeMap<String, SignedPolicy>,
    /// Active state this one was derived from
    #[serde(default)]
    pub base: Option<ObjectId>,
}

impl PolicyState {
    /// Fresh state anchored on `trust`
    pub fn new(trust: RootOfTrust) -> Self {
        Self {
            roots: trust.into_history(),
            files: BTreeMap::new(),
            base: None,
        }
    }

    /// Load a stored state
    pub fn load<R: Repository + ?Sized>(repo: &R, id: &ObjectId) -> Result<Self> {
        repo.get_json(id)
    }

    /// Store this state, returning its id
    pub fn store<R: Repository + ?Sized>(&self, repo: &R) -> Result<ObjectId> {
        repo.put_json(self)
    }

    /// Active root metadata
    pub fn root(&self) -> Result<&RootMetadata> {
        self.roots
            .last()
            .map(Envelope::payload)
            .ok_or_else(|| RefguardError::not_found("root of trust"))
    }

    /// Root history as a [`RootOfTrust`], re-verifying every transition
    pub fn trust(&self) -> Result<RootOfTrust> {
        RootOfTrust::from_history(self.roots.clone())
    }

    /// Policy file named `name`
    pub fn file(&self, name: &str) -> Option<&SignedPolicy> {
        self.files.get(name)
    }

    /// Policy file named `name`, failing when absent
    pub fn require_file(&self, name: &str) -> Result<&SignedPolicy> {
        self.file(name)
            .ok_or_else(|| RefguardError::not_found(format!("policy '{name}'")))
    }

    /// Signers and threshold pinned for `name` by the delegation chain
    ///
    /// Only files reachable from the default file are consulted, depth first
    /// in declaration order. Delegations declared by unreferenced files pin
    /// nothing.
    pub fn delegation_pin(&self, name: &str) -> Option<(BTreeMap<KeyId, PublicKey>, usize)> {
        let default = self.file(DEFAULT_POLICY)?.payload();
        let mut visited = BTreeSet::from([DEFAULT_POLICY]);
        self.find_pin(default, name, &mut visited)
    }

    fn find_pin<'s>(
        &'s self,
        parent: &'s PolicyFile,
        name: &str,
        visited: &mut BTreeSet<&'s str>,
    ) -> Option<(BTreeMap<KeyId, PublicKey>, usize)> {
        for rule in &parent.rules {
            let Authority::Delegate {
                policy,
                signers,
                threshold,
            } = &rule.authority
            else {
                continue;
            };
            if policy == name {
                let keys = signers
                    .iter()
                    .filter_map(|id| parent.keys.get(id).map(|k| (id.clone(), k.clone())))
                    .collect();
                return Some((keys, *threshold));
            }
            if !visited.insert(policy.as_str()) {
                continue;
            }
            if let Some(child) = self.file(policy) {
                if let Some(pin) = self.find_pin(child.payload(), name, visited) {
                    return Some(pin);
                }
            }
        }
        None
    }

    /// Keys and threshold that must sign policy `name`
    ///
    /// The default file answers to the root's policy keys and a delegated
    /// file to its [`delegation_pin`](Self::delegation_pin). A file nothing
    /// reachable delegates to answers to its own declared signers; evaluation
    /// never reaches it.
    pub fn signing_requirement(&self, name: &str) -> Result<(BTreeMap<KeyId, PublicKey>, usize)> {
        if name == DEFAULT_POLICY {
            let root = self.root()?;
            return Ok((root.policy_keys.clone(), root.policy_threshold));
        }
        if let Some(pin) = self.delegation_pin(name) {
            return Ok(pin);
        }
        let file = self.require_file(name)?.payload();
        Ok((file.signer_keys(), file.threshold))
    }

    /// Full consistency check
    ///
    /// The root chain must verify, every file must carry its threshold of
    /// signatures, delegated files must match the signers and threshold their
    /// delegation pins, and delegations must be acyclic.
    pub fn validate(&self) -> Result<()> {
        verify_root_chain(&self.roots)?;

        for (name, signed) in &self.files {
            let file = signed.payload();
            if &file.name != name {
                return Err(RefguardError::invalid(format!(
                    "policy stored as '{name}' is named '{}'",
                    file.name
                )));
            }
            let (trusted, threshold) = self.signing_requirement(name)?;
            signed.verify_threshold(&format!("policy '{name}'"), &trusted, threshold)?;
        }

        if let Some(default) = self.file(DEFAULT_POLICY) {
            let mut visiting = BTreeSet::new();
            self.check_delegations(default.payload(), &mut visiting)?;
        }
        Ok(())
    }

    fn check_delegations(&self, file: &PolicyFile, visiting: &mut BTreeSet<String>) -> Result<()> {
        if !visiting.insert(file.name.clone()) {
            return Err(RefguardError::DelegationCycle {
                policy: file.name.clone(),
            });
        }
        for rule in &file.rules {
            let Authority::Delegate {
                policy,
                signers,
                threshold,
            } = &rule.authority
            else {
                continue;
            };
            let Some(delegated) = self.file(policy) else {
                continue;
            };
            let delegated = delegated.payload();
            if &delegated.signers != signers || delegated.threshold != *threshold {
                return Err(RefguardError::invalid(format!(
                    "policy '{policy}' does not match the signers pinned by rule '{}'",
                    rule.name
                )));
            }
            self.check_delegations(delegated, visiting)?;
        }
        visiting.remove(&file.name);
        Ok(())
    }

    /// Check that this state may replace `previous` as the active state
    ///
    /// The root history may only grow and no policy file may go back to an
    /// older version.
    pub fn validate_successor_of(&self, previous: &PolicyState) -> Result<()> {
        if self.roots.len() < previous.roots.len()
            || self.roots[..previous.roots.len()] != previous.roots[..]
        {
            return Err(RefguardError::chain_broken(
                "root history does not extend the active root history",
            ));
        }
        for (name, old) in &previous.files {
            if let Some(new) = self.files.get(name) {
                if new.payload().version < old.payload().version {
                    return Err(RefguardError::stale_version(format!(
                        "policy '{name}' v{} is older than active v{}",
                        new.payload().version,
                        old.payload().version
                    )));
                }
            }
        }
        Ok(())
    }
}
