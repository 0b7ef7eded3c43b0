//! Rule evaluation
//!
//! Resolution starts in the default policy file and takes the first rule, in
//! declaration order, whose patterns cover the target. A delegating rule
//! continues the search in the delegated file with the same target; a rule
//! listing keys ends it. Anything that does not resolve is denied.
//!
//! Evaluation trusts the state it is given: signature thresholds and
//! delegation pinning are checked once by [`PolicyState::validate`] when a
//! state is applied or replayed.

use refguard_core::{KeyId, RefguardError, Result, Signature};
use std::collections::BTreeSet;

use crate::file::{Authority, Rule, DEFAULT_POLICY};
use crate::pattern::Target;
use crate::state::PolicyState;

/// One hop of a resolution: the rule that matched and the file it lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionStep {
    /// Policy file the rule belongs to
    pub policy: String,
    /// The matching rule
    pub rule: Rule,
}

/// Path from the default file to the governing rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    delegations: Vec<ResolutionStep>,
    governing: ResolutionStep,
}

impl Resolution {
    /// Every hop, starting in the default file and ending at the governing rule
    pub fn steps(&self) -> impl Iterator<Item = &ResolutionStep> {
        self.delegations.iter().chain(std::iter::once(&self.governing))
    }

    /// The rule that decides
    pub fn governing(&self) -> &ResolutionStep {
        &self.governing
    }

    /// Keys the governing rule authorizes
    pub fn authorized_keys(&self) -> &BTreeSet<KeyId> {
        self.governing.rule.referenced_keys()
    }
}

/// A successful authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    /// File holding the governing rule
    pub policy: String,
    /// Governing rule name
    pub rule: String,
    /// Key whose signature satisfied the rule
    pub signer: KeyId,
}

/// Evaluates targets against one policy state
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'s> {
    state: &'s PolicyState,
}

impl<'s> Evaluator<'s> {
    /// Evaluator over `state`
    pub fn new(state: &'s PolicyState) -> Self {
        Self { state }
    }

    /// Find the governing rule for `target`
    pub fn resolve(&self, target: &Target) -> Result<Resolution> {
        let no_match = || RefguardError::NoMatchingRule {
            target: target.to_string(),
        };
        let mut file = self.state.file(DEFAULT_POLICY).ok_or_else(no_match)?.payload();
        let mut visited = BTreeSet::from([file.name.clone()]);
        let mut delegations = Vec::new();

        loop {
            let rule = file.first_match(target).ok_or_else(no_match)?;
            let step = ResolutionStep {
                policy: file.name.clone(),
                rule: rule.clone(),
            };
            match &rule.authority {
                Authority::Keys { .. } => {
                    tracing::trace!(%target, policy = %file.name, rule = %rule.name, "resolved");
                    return Ok(Resolution {
                        delegations,
                        governing: step,
                    });
                }
                Authority::Delegate { policy, .. } => {
                    if !visited.insert(policy.clone()) {
                        return Err(RefguardError::DelegationCycle {
                            policy: policy.clone(),
                        });
                    }
                    let Some(delegated) = self.state.file(policy) else {
                        tracing::debug!(%target, policy = %policy, "delegated policy not present");
                        return Err(no_match());
                    };
                    delegations.push(step);
                    file = delegated.payload();
                }
            }
        }
    }

    /// Decide whether `signatures` over `payload` may change `target`
    ///
    /// One valid signature by a key the governing rule lists is enough. A
    /// target no rule covers is unauthorized.
    pub fn authorize(
        &self,
        target: &Target,
        payload: &[u8],
        signatures: &[Signature],
    ) -> Result<Authorization> {
        let resolution = match self.resolve(target) {
            Ok(resolution) => resolution,
            Err(RefguardError::NoMatchingRule { .. }) => {
                return Err(RefguardError::Unauthorized {
                    target: target.to_string(),
                    reason: "no rule covers this target".to_string(),
                })
            }
            Err(e) => return Err(e),
        };
        self.check_signatures(target, &resolution, payload, signatures)
    }

    /// Like [`Evaluator::authorize`], but a path no rule covers is unprotected
    /// and yields `None`
    pub fn authorize_path(
        &self,
        target: &Target,
        payload: &[u8],
        signatures: &[Signature],
    ) -> Result<Option<Authorization>> {
        match self.resolve(target) {
            Ok(resolution) => self
                .check_signatures(target, &resolution, payload, signatures)
                .map(Some),
            Err(RefguardError::NoMatchingRule { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn check_signatures(
        &self,
        target: &Target,
        resolution: &Resolution,
        payload: &[u8],
        signatures: &[Signature],
    ) -> Result<Authorization> {
        let governing = resolution.governing();
        let file = self.state.require_file(&governing.policy)?.payload();
        let authorized = resolution.authorized_keys();

        for signature in signatures {
            if !authorized.contains(&signature.key_id) {
                continue;
            }
            let Some(public_key) = file.keys.get(&signature.key_id) else {
                continue;
            };
            if public_key.verify(payload, signature).is_ok() {
                return Ok(Authorization {
                    policy: governing.policy.clone(),
                    rule: governing.rule.name.clone(),
                    signer: signature.key_id.clone(),
                });
            }
        }

        let signers: Vec<&str> = signatures.iter().map(|s| s.key_id.short()).collect();
        Err(RefguardError::Unauthorized {
            target: target.to_string(),
            reason: format!(
                "rule '{}' in policy '{}' does not authorize signer(s) [{}]",
                governing.rule.name,
                governing.policy,
                signers.join(", ")
            ),
        })
    }
}
