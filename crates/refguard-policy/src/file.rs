//! Policy files and rules
//!
//! A policy file is an ordered list of rules. Each rule claims a set of
//! patterns and either names the keys allowed to touch them or delegates the
//! decision to another policy file, pinning that file's signers and threshold.

use refguard_core::{KeyId, PublicKey, RefguardError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::pattern::{Pattern, Target};

/// Name of the policy file signed by the root's policy keys
pub const DEFAULT_POLICY: &str = "default";

/// Who decides for the targets a rule matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Authority {
    /// Any one of these keys may sign
    Keys {
        /// Authorized key fingerprints
        keys: BTreeSet<KeyId>,
    },
    /// A delegated policy file decides
    Delegate {
        /// Delegated policy file name
        policy: String,
        /// Keys that must sign the delegated file
        signers: BTreeSet<KeyId>,
        /// Signatures the delegated file needs
        threshold: usize,
    },
}

/// A named rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique within its file
    pub name: String,
    /// Targets the rule covers
    pub patterns: Vec<Pattern>,
    /// Decision authority for covered targets
    pub authority: Authority,
}

impl Rule {
    /// Rule authorizing any of `keys`
    pub fn keys(
        name: impl Into<String>,
        patterns: Vec<Pattern>,
        keys: impl IntoIterator<Item = KeyId>,
    ) -> Self {
        Self {
            name: name.into(),
            patterns,
            authority: Authority::Keys {
                keys: keys.into_iter().collect(),
            },
        }
    }

    /// Rule delegating to the policy file `policy`
    pub fn delegate(
        name: impl Into<String>,
        patterns: Vec<Pattern>,
        policy: impl Into<String>,
        signers: impl IntoIterator<Item = KeyId>,
        threshold: usize,
    ) -> Self {
        Self {
            name: name.into(),
            patterns,
            authority: Authority::Delegate {
                policy: policy.into(),
                signers: signers.into_iter().collect(),
                threshold,
            },
        }
    }

    /// Whether any pattern covers `target`
    pub fn matches(&self, target: &Target) -> bool {
        self.patterns.iter().any(|p| p.matches(target))
    }

    /// Keys this rule refers to, either as authorized signers or delegation signers
    pub fn referenced_keys(&self) -> &BTreeSet<KeyId> {
        match &self.authority {
            Authority::Keys { keys } => keys,
            Authority::Delegate { signers, .. } => signers,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(RefguardError::invalid("rule name must not be empty"));
        }
        if self.patterns.is_empty() {
            return Err(RefguardError::invalid(format!(
                "rule '{}' has no patterns",
                self.name
            )));
        }
        match &self.authority {
            Authority::Keys { keys } if keys.is_empty() => Err(RefguardError::invalid(format!(
                "rule '{}' authorizes no keys",
                self.name
            ))),
            Authority::Delegate {
                policy,
                signers,
                threshold,
            } => {
                if policy == DEFAULT_POLICY {
                    return Err(RefguardError::DelegationCycle {
                        policy: policy.clone(),
                    });
                }
                if *threshold < 1 || *threshold > signers.len() {
                    return Err(RefguardError::invalid_threshold(*threshold, signers.len()));
                }
                Ok(())
            }
            Authority::Keys { .. } => Ok(()),
        }
    }
}

/// A versioned policy file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFile {
    /// File name, [`DEFAULT_POLICY`] for the root-anchored file
    pub name: String,
    /// Bumped on every content change
    pub version: u64,
    /// Keys allowed to sign this file
    pub signers: BTreeSet<KeyId>,
    /// Signatures this file needs
    pub threshold: usize,
    /// Public keys referenced by the file and its rules
    pub keys: BTreeMap<KeyId, PublicKey>,
    /// Rules in evaluation order
    pub rules: Vec<Rule>,
}

impl PolicyFile {
    /// Empty version 1 file signed by `signers`
    pub fn new(
        name: impl Into<String>,
        signers: impl IntoIterator<Item = PublicKey>,
        threshold: usize,
    ) -> Result<Self> {
        let keys: BTreeMap<KeyId, PublicKey> =
            signers.into_iter().map(|k| (k.key_id(), k)).collect();
        if threshold < 1 || threshold > keys.len() {
            return Err(RefguardError::invalid_threshold(threshold, keys.len()));
        }
        Ok(Self {
            name: name.into(),
            version: 1,
            signers: keys.keys().cloned().collect(),
            threshold,
            keys,
            rules: Vec::new(),
        })
    }

    /// Whether this is the default policy file
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_POLICY
    }

    /// Rule named `name`
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// First rule, in declaration order, covering `target`
    pub fn first_match(&self, target: &Target) -> Option<&Rule> {
        self.rules.iter().find(|r| r.matches(target))
    }

    /// Public keys of the file's signers that the file knows about
    pub fn signer_keys(&self) -> BTreeMap<KeyId, PublicKey> {
        self.keys
            .iter()
            .filter(|(id, _)| self.signers.contains(*id))
            .map(|(id, key)| (id.clone(), key.clone()))
            .collect()
    }

    /// Next version with `rule` appended and `keys` registered
    pub fn with_rule(&self, rule: Rule, keys: impl IntoIterator<Item = PublicKey>) -> Result<Self> {
        if self.rule(&rule.name).is_some() {
            return Err(RefguardError::DuplicateRuleName {
                policy: self.name.clone(),
                rule: rule.name,
            });
        }
        rule.validate()?;
        let mut next = self.clone();
        for key in keys {
            next.keys.insert(key.key_id(), key);
        }
        if let Some(missing) = rule.referenced_keys().iter().find(|id| !next.keys.contains_key(*id)) {
            return Err(RefguardError::not_found(format!(
                "public key {missing} for rule '{}'",
                rule.name
            )));
        }
        next.rules.push(rule);
        next.version += 1;
        Ok(next)
    }

    /// Next version without the rule named `name`
    pub fn without_rule(&self, name: &str) -> Result<Self> {
        let position = self
            .rules
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| {
                RefguardError::not_found(format!("rule '{name}' in policy '{}'", self.name))
            })?;
        let mut next = self.clone();
        next.rules.remove(position);
        next.version += 1;
        Ok(next)
    }

    /// Next version with signers and threshold replaced
    pub fn with_signers(
        &self,
        signers: &BTreeMap<KeyId, PublicKey>,
        threshold: usize,
    ) -> Self {
        let mut next = self.clone();
        for (id, key) in signers {
            next.keys.insert(id.clone(), key.clone());
        }
        next.signers = signers.keys().cloned().collect();
        next.threshold = threshold;
        next.version += 1;
        next
    }
}
