//! Repository-backed policy store
//!
//! Edits never touch the active state directly. Each edit loads the working
//! state (the staged state, or a fresh copy of the active one), produces a new
//! state value and moves [`POLICY_STAGING_REF`] to it. [`PolicyStore::apply`]
//! later promotes the staged state to [`POLICY_REF`] once it validates and
//! was derived from the state that is still active.
//!
//! Root updates that need more than one session to collect their signatures
//! wait under [`ROOT_PROPOSAL_REF`] until the active root threshold is met.

use refguard_core::{
    Envelope, KeyId, ObjectId, ObjectStoreExt, PublicKey, RefguardError, Repository, Result,
    SigningKey, POLICY_REF, POLICY_STAGING_REF, ROOT_PROPOSAL_REF,
};
use std::collections::BTreeMap;

use crate::evaluator::{Evaluator, Resolution};
use crate::file::{PolicyFile, Rule, DEFAULT_POLICY};
use crate::pattern::Target;
use crate::root::{RootChange, RootMetadata, RootOfTrust, SignedRoot};
use crate::state::PolicyState;

/// Result of promoting the staged state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Newly active state
    pub state: ObjectId,
    /// State it replaced
    pub previous: Option<ObjectId>,
}

/// Where a root update stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootUpdate {
    /// Threshold met, the new root is part of the staged state
    Staged(ObjectId),
    /// Stored under [`ROOT_PROPOSAL_REF`], waiting for more root signatures
    Pending {
        /// Proposed root version
        version: u64,
        /// Valid signatures by active root keys so far
        have: usize,
        /// Active root threshold
        need: usize,
    },
}

struct Working {
    /// Current value of the staging reference
    staged_ref: Option<ObjectId>,
    state: PolicyState,
}

/// Policy store over a repository
pub struct PolicyStore<'r, R: Repository + ?Sized> {
    repo: &'r R,
}

impl<'r, R: Repository + ?Sized> PolicyStore<'r, R> {
    /// Store over `repo`
    pub fn new(repo: &'r R) -> Self {
        Self { repo }
    }

    /// Id of the active state
    pub fn active_id(&self) -> Result<Option<ObjectId>> {
        self.repo.read_ref(POLICY_REF)
    }

    /// The active state, if any policy was ever applied
    pub fn active(&self) -> Result<Option<PolicyState>> {
        self.active_id()?
            .map(|id| PolicyState::load(self.repo, &id))
            .transpose()
    }

    /// The active state, failing when none exists
    pub fn require_active(&self) -> Result<PolicyState> {
        self.active()?
            .ok_or_else(|| RefguardError::not_found("no policy has been applied"))
    }

    /// The staged state, if it differs from the active one
    pub fn staged(&self) -> Result<Option<PolicyState>> {
        let staged = self.repo.read_ref(POLICY_STAGING_REF)?;
        match staged {
            Some(id) if Some(id) != self.active_id()? => PolicyState::load(self.repo, &id).map(Some),
            _ => Ok(None),
        }
    }

    fn working(&self) -> Result<Working> {
        let active = self.active_id()?;
        let staged_ref = self.repo.read_ref(POLICY_STAGING_REF)?;
        let state = match (staged_ref, active) {
            (Some(staged), active) if Some(staged) != active => PolicyState::load(self.repo, &staged)?,
            (_, Some(active)) => {
                let mut state = PolicyState::load(self.repo, &active)?;
                state.base = Some(active);
                state
            }
            (_, None) => return Err(RefguardError::not_found("root of trust is not initialized")),
        };
        Ok(Working { staged_ref, state })
    }

    fn stage(&self, working: Working) -> Result<ObjectId> {
        let id = working.state.store(self.repo)?;
        self.repo
            .update_ref(POLICY_STAGING_REF, id, working.staged_ref)?;
        tracing::debug!(state = %id.short(), "policy state staged");
        Ok(id)
    }

    /// Create and stage root version 1, signed by `signers`
    pub fn init_root(
        &self,
        root_keys: impl IntoIterator<Item = PublicKey>,
        threshold: usize,
        signers: &[&SigningKey],
    ) -> Result<ObjectId> {
        if self.active_id()?.is_some() || self.repo.read_ref(POLICY_STAGING_REF)?.is_some() {
            return Err(RefguardError::invalid("root of trust is already initialized"));
        }
        let mut trust = RootOfTrust::empty();
        let mut candidate = Envelope::new(RootMetadata::initial(root_keys, threshold)?);
        for key in signers {
            candidate = trust.sign(candidate, key)?;
        }
        trust.activate(candidate)?;
        self.stage(Working {
            staged_ref: None,
            state: PolicyState::new(trust),
        })
    }

    /// Propose the next root version with `changes`, signed by `signers`
    ///
    /// The candidate is kept under [`ROOT_PROPOSAL_REF`] so further root
    /// signatures can be added later with [`PolicyStore::sign_root`]. Once
    /// the active root threshold is met the new root is staged. When the
    /// policy keys or threshold change, the default policy file picks up the
    /// new signer set and has to be signed again.
    pub fn update_root(&self, changes: &[RootChange], signers: &[&SigningKey]) -> Result<RootUpdate> {
        let working = self.working()?;
        let trust = working.state.trust()?;
        let mut candidate = Envelope::new(trust.propose_update(changes)?);
        for key in signers {
            candidate = trust.sign(candidate, key)?;
        }
        self.advance_root(working, trust, candidate)
    }

    /// Add `key`'s signature to the pending root update
    pub fn sign_root(&self, key: &SigningKey) -> Result<RootUpdate> {
        let working = self.working()?;
        let trust = working.state.trust()?;
        let candidate = self
            .pending_root(&trust)?
            .ok_or_else(|| RefguardError::not_found("no pending root update"))?;
        let candidate = trust.sign(candidate, key)?;
        self.advance_root(working, trust, candidate)
    }

    /// The stored root candidate, if it still follows the working root
    pub fn pending_root(&self, trust: &RootOfTrust) -> Result<Option<SignedRoot>> {
        let Some(id) = self.repo.read_ref(ROOT_PROPOSAL_REF)? else {
            return Ok(None);
        };
        let candidate: SignedRoot = self.repo.get_json(&id)?;
        let next = trust.current()?.version + 1;
        Ok((candidate.payload().version == next).then_some(candidate))
    }

    fn advance_root(
        &self,
        mut working: Working,
        mut trust: RootOfTrust,
        candidate: SignedRoot,
    ) -> Result<RootUpdate> {
        let active = trust.current()?;
        let have = candidate.valid_signers(&active.root_keys)?.len();
        let need = active.root_threshold;
        let version = candidate.payload().version;

        let proposal = self.repo.put_json(&candidate)?;
        let previous = self.repo.read_ref(ROOT_PROPOSAL_REF)?;
        self.repo.update_ref(ROOT_PROPOSAL_REF, proposal, previous)?;
        if have < need {
            tracing::info!(version, have, need, "root update proposed, more root signatures needed");
            return Ok(RootUpdate::Pending {
                version,
                have,
                need,
            });
        }

        trust.activate(candidate)?;
        working.state.roots = trust.into_history();

        let root = working.state.root()?.clone();
        if let Some(default) = working.state.files.get_mut(DEFAULT_POLICY) {
            let file = default.payload();
            let signers_changed = file.signers.len() != root.policy_keys.len()
                || !root.policy_keys.keys().all(|id| file.signers.contains(id));
            if signers_changed || file.threshold != root.policy_threshold {
                let next = file.with_signers(&root.policy_keys, root.policy_threshold);
                tracing::warn!(version = next.version, "default policy signers changed, re-signing required");
                *default = Envelope::new(next);
            }
        }
        self.stage(working).map(RootUpdate::Staged)
    }

    fn require_signer(state: &PolicyState, policy: &str, key: &SigningKey) -> Result<()> {
        let (trusted, _) = state.signing_requirement(policy)?;
        if !trusted.contains_key(&key.key_id()) {
            return Err(RefguardError::UnauthorizedSigner {
                key_id: key.key_id().to_string(),
                subject: format!("policy '{policy}'"),
            });
        }
        Ok(())
    }

    /// Create policy file `name`, signed by `key`
    ///
    /// The default file always takes its signers and threshold from the root's
    /// policy keys. A file the delegation chain already pins takes the pinned
    /// signers; explicit `signers` must then match the pin. Otherwise the file
    /// is signed by `signers`, or by `key` alone when none are given.
    pub fn init_file(
        &self,
        name: &str,
        signers: impl IntoIterator<Item = PublicKey>,
        threshold: usize,
        key: &SigningKey,
    ) -> Result<ObjectId> {
        let mut working = self.working()?;
        if working.state.files.contains_key(name) {
            return Err(RefguardError::invalid(format!("policy '{name}' already exists")));
        }
        let requested: BTreeMap<KeyId, PublicKey> =
            signers.into_iter().map(|k| (k.key_id(), k)).collect();
        let file = if name == DEFAULT_POLICY {
            let root = working.state.root()?;
            PolicyFile::new(name, root.policy_keys.values().cloned(), root.policy_threshold)?
        } else if let Some((pinned, pinned_threshold)) = working.state.delegation_pin(name) {
            if !requested.is_empty()
                && (!requested.keys().eq(pinned.keys()) || threshold != pinned_threshold)
            {
                return Err(RefguardError::invalid(format!(
                    "policy '{name}' must use the signers and threshold its delegation pins"
                )));
            }
            PolicyFile::new(name, pinned.into_values(), pinned_threshold)?
        } else if requested.is_empty() {
            PolicyFile::new(name, [key.public_key()], threshold)?
        } else {
            PolicyFile::new(name, requested.into_values(), threshold)?
        };
        if !file.signers.contains(&key.key_id()) {
            return Err(RefguardError::UnauthorizedSigner {
                key_id: key.key_id().to_string(),
                subject: format!("policy '{name}'"),
            });
        }
        let signed = Envelope::new(file).sign(key)?;
        working.state.files.insert(name.to_string(), signed);
        tracing::info!(policy = name, "policy file initialized");
        self.stage(working)
    }

    fn edit_file(
        &self,
        policy: &str,
        key: &SigningKey,
        edit: impl FnOnce(&PolicyFile) -> Result<PolicyFile>,
    ) -> Result<ObjectId> {
        let mut working = self.working()?;
        Self::require_signer(&working.state, policy, key)?;
        let current = working.state.require_file(policy)?.payload();
        let next = edit(current)?;
        // content changed, so earlier approvals no longer apply
        let signed = Envelope::new(next).sign(key)?;
        working.state.files.insert(policy.to_string(), signed);
        self.stage(working)
    }

    /// Append `rule` to `policy`, registering `keys`, and re-sign with `key`
    pub fn add_rule(
        &self,
        policy: &str,
        rule: Rule,
        keys: impl IntoIterator<Item = PublicKey>,
        key: &SigningKey,
    ) -> Result<ObjectId> {
        let name = rule.name.clone();
        let id = self.edit_file(policy, key, |file| file.with_rule(rule, keys))?;
        tracing::info!(policy, rule = %name, "rule added");
        Ok(id)
    }

    /// Remove the rule `rule` from `policy` and re-sign with `key`
    pub fn remove_rule(&self, policy: &str, rule: &str, key: &SigningKey) -> Result<ObjectId> {
        let id = self.edit_file(policy, key, |file| file.without_rule(rule))?;
        tracing::info!(policy, rule, "rule removed");
        Ok(id)
    }

    /// Rules of `policy` in the working state
    pub fn list_rules(&self, policy: &str) -> Result<Vec<Rule>> {
        let working = self.working()?;
        Ok(working.state.require_file(policy)?.payload().rules.clone())
    }

    /// Add `key`'s approval to `policy`
    ///
    /// Returns `false`, leaving the file unchanged, when `key` is not one of
    /// the file's signers.
    pub fn sign(&self, policy: &str, key: &SigningKey) -> Result<bool> {
        let mut working = self.working()?;
        if Self::require_signer(&working.state, policy, key).is_err() {
            tracing::warn!(policy, key_id = %key.key_id().short(), "key is not a signer of this policy, signature not added");
            return Ok(false);
        }
        let signed = working.state.require_file(policy)?.clone().sign(key)?;
        working.state.files.insert(policy.to_string(), signed);
        self.stage(working)?;
        tracing::info!(policy, key_id = %key.key_id().short(), "policy signed");
        Ok(true)
    }

    /// Promote the staged state to active
    pub fn apply(&self) -> Result<Applied> {
        let active = self.active_id()?;
        let staged = match self.repo.read_ref(POLICY_STAGING_REF)? {
            Some(id) if Some(id) != active => id,
            _ => return Err(RefguardError::not_found("no staged policy changes")),
        };
        let state = PolicyState::load(self.repo, &staged)?;
        if state.base != active {
            return Err(RefguardError::stale_version(
                "the active policy changed since these changes were staged",
            ));
        }
        state.validate()?;
        if let Some(active) = active {
            state.validate_successor_of(&PolicyState::load(self.repo, &active)?)?;
        }

        self.repo
            .update_ref(POLICY_REF, staged, active)
            .map_err(|e| match e {
                RefguardError::RefConflict { .. } => {
                    RefguardError::stale_version("the active policy moved during apply")
                }
                other => other,
            })?;
        tracing::info!(state = %staged.short(), "policy applied");
        Ok(Applied {
            state: staged,
            previous: active,
        })
    }

    /// Drop staged changes by pointing staging back at the active state
    ///
    /// Returns `false` when nothing was staged. This is also the way out of
    /// staged changes made stale by a newer active policy.
    pub fn discard(&self) -> Result<bool> {
        let active = self
            .active_id()?
            .ok_or_else(|| RefguardError::not_found("no policy has been applied"))?;
        let staged = self.repo.read_ref(POLICY_STAGING_REF)?;
        if staged == Some(active) {
            return Ok(false);
        }
        self.repo.update_ref(POLICY_STAGING_REF, active, staged)?;
        tracing::info!(state = %active.short(), "staged policy changes discarded");
        Ok(true)
    }

    /// Governing rule for `target` under the active policy
    pub fn resolve(&self, target: &Target) -> Result<Resolution> {
        let state = self.require_active()?;
        Evaluator::new(&state).resolve(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use refguard_core::{MemoryRepository, RefStore};
    use refguard_testkit::Actors;

    fn pattern(s: &str) -> crate::Pattern {
        s.parse().unwrap()
    }

    /// Root initialized and applied with `targets` as the only policy key
    fn ready(repo: &MemoryRepository, actors: &Actors, policy_threshold: usize, extra: &[&SigningKey]) {
        let store = PolicyStore::new(repo);
        store
            .init_root([actors.root.public_key()], 1, &[&actors.root])
            .unwrap();
        let mut changes = vec![RootChange::AddPolicyKey(actors.targets.public_key())];
        changes.extend(extra.iter().map(|k| RootChange::AddPolicyKey(k.public_key())));
        changes.push(RootChange::SetPolicyThreshold(policy_threshold));
        store.update_root(&changes, &[&actors.root]).unwrap();
        store.apply().unwrap();
    }

    #[test]
    fn test_apply_requires_staged_changes() {
        let repo = MemoryRepository::new();
        let store = PolicyStore::new(&repo);
        assert_matches!(store.apply(), Err(RefguardError::NotFound { .. }));
        ready(&repo, &Actors::new(), 1, &[]);
        assert_matches!(store.apply(), Err(RefguardError::NotFound { .. }));
    }

    #[test]
    fn test_init_root_twice_fails() {
        let repo = MemoryRepository::new();
        let actors = Actors::new();
        ready(&repo, &actors, 1, &[]);
        assert_matches!(
            PolicyStore::new(&repo).init_root([actors.root.public_key()], 1, &[&actors.root]),
            Err(RefguardError::Invalid { .. })
        );
    }

    #[test]
    fn test_threshold_policy_needs_second_signature() {
        let repo = MemoryRepository::new();
        let actors = Actors::new();
        ready(&repo, &actors, 2, &[&actors.developer1, &actors.developer2]);
        let store = PolicyStore::new(&repo);

        store
            .init_file(DEFAULT_POLICY, [], 0, &actors.developer1)
            .unwrap();
        store
            .add_rule(
                DEFAULT_POLICY,
                Rule::keys("protect-main", vec![pattern("git:refs/heads/main")], [actors.developer1.key_id()]),
                [actors.developer1.public_key()],
                &actors.developer1,
            )
            .unwrap();
        assert_matches!(
            store.apply(),
            Err(RefguardError::InsufficientSignatures { have: 1, need: 2, .. })
        );

        assert!(store.sign(DEFAULT_POLICY, &actors.developer2).unwrap());
        store.apply().unwrap();
        let rules = store.list_rules(DEFAULT_POLICY).unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_content_change_clears_other_approvals() {
        let repo = MemoryRepository::new();
        let actors = Actors::new();
        ready(&repo, &actors, 2, &[&actors.developer1, &actors.developer2]);
        let store = PolicyStore::new(&repo);

        store.init_file(DEFAULT_POLICY, [], 0, &actors.developer1).unwrap();
        store.sign(DEFAULT_POLICY, &actors.developer2).unwrap();
        store
            .add_rule(
                DEFAULT_POLICY,
                Rule::keys("protect-main", vec![pattern("git:refs/heads/main")], [actors.developer1.key_id()]),
                [actors.developer1.public_key()],
                &actors.developer1,
            )
            .unwrap();
        assert_matches!(store.apply(), Err(RefguardError::InsufficientSignatures { .. }));
    }

    #[test]
    fn test_unauthorized_signers() {
        let repo = MemoryRepository::new();
        let actors = Actors::new();
        ready(&repo, &actors, 1, &[]);
        let store = PolicyStore::new(&repo);

        assert_matches!(
            store.init_file(DEFAULT_POLICY, [], 0, &actors.unauthorized),
            Err(RefguardError::UnauthorizedSigner { .. })
        );
        assert_matches!(
            store.init_file("team", [actors.developer1.public_key()], 1, &actors.developer2),
            Err(RefguardError::UnauthorizedSigner { .. })
        );
        store.init_file(DEFAULT_POLICY, [], 0, &actors.targets).unwrap();
        assert!(!store.sign(DEFAULT_POLICY, &actors.unauthorized).unwrap());
        assert_matches!(
            store.add_rule(
                DEFAULT_POLICY,
                Rule::keys("x", vec![pattern("git:refs/heads/x")], [actors.developer1.key_id()]),
                [actors.developer1.public_key()],
                &actors.unauthorized,
            ),
            Err(RefguardError::UnauthorizedSigner { .. })
        );
    }

    #[test]
    fn test_stale_staged_state() {
        let repo = MemoryRepository::new();
        let actors = Actors::new();
        ready(&repo, &actors, 1, &[]);
        let store = PolicyStore::new(&repo);
        store.init_file(DEFAULT_POLICY, [], 0, &actors.targets).unwrap();
        let staged = repo.read_ref(POLICY_STAGING_REF).unwrap().unwrap();

        // someone else applies a different change first
        store.apply().unwrap();
        store
            .add_rule(
                DEFAULT_POLICY,
                Rule::keys("main", vec![pattern("git:refs/heads/main")], [actors.developer1.key_id()]),
                [actors.developer1.public_key()],
                &actors.targets,
            )
            .unwrap();
        store.apply().unwrap();

        let current = repo.read_ref(POLICY_STAGING_REF).unwrap();
        repo.update_ref(POLICY_STAGING_REF, staged, current).unwrap();
        assert_matches!(store.apply(), Err(RefguardError::StaleVersion { .. }));

        assert!(store.discard().unwrap());
        assert!(!store.discard().unwrap());
        store
            .add_rule(
                DEFAULT_POLICY,
                Rule::keys("feature", vec![pattern("git:refs/heads/feature")], [actors.developer2.key_id()]),
                [actors.developer2.public_key()],
                &actors.targets,
            )
            .unwrap();
        store.apply().unwrap();
        assert_eq!(store.list_rules(DEFAULT_POLICY).unwrap().len(), 2);
    }

    #[test]
    fn test_remove_rule_and_resolve() {
        let repo = MemoryRepository::new();
        let actors = Actors::new();
        ready(&repo, &actors, 1, &[]);
        let store = PolicyStore::new(&repo);
        store.init_file(DEFAULT_POLICY, [], 0, &actors.targets).unwrap();
        store
            .add_rule(
                DEFAULT_POLICY,
                Rule::keys("main", vec![pattern("git:refs/heads/main")], [actors.developer1.key_id()]),
                [actors.developer1.public_key()],
                &actors.targets,
            )
            .unwrap();
        store.apply().unwrap();
        let resolution = store.resolve(&Target::reference("main")).unwrap();
        assert_eq!(resolution.governing().rule.name, "main");

        assert_matches!(
            store.remove_rule(DEFAULT_POLICY, "absent", &actors.targets),
            Err(RefguardError::NotFound { .. })
        );
        store.remove_rule(DEFAULT_POLICY, "main", &actors.targets).unwrap();
        store.apply().unwrap();
        assert_matches!(
            store.resolve(&Target::reference("main")),
            Err(RefguardError::NoMatchingRule { .. })
        );
    }

    #[test]
    fn test_delegated_file_answers_to_reachable_pin() {
        let repo = MemoryRepository::new();
        let actors = Actors::new();
        ready(&repo, &actors, 1, &[]);
        let store = PolicyStore::new(&repo);
        store.init_file(DEFAULT_POLICY, [], 0, &actors.targets).unwrap();
        store
            .add_rule(
                DEFAULT_POLICY,
                Rule::delegate(
                    "feature",
                    vec![pattern("git:refs/heads/feature")],
                    "feature",
                    [actors.developer2.key_id()],
                    1,
                ),
                [actors.developer2.public_key()],
                &actors.targets,
            )
            .unwrap();
        store.apply().unwrap();

        // an unreferenced file may exist, but its delegations pin nothing
        store.init_file("aaa", [], 1, &actors.unauthorized).unwrap();
        store
            .add_rule(
                "aaa",
                Rule::delegate(
                    "hijack",
                    vec![pattern("git:refs/heads/*")],
                    "feature",
                    [actors.unauthorized.key_id()],
                    1,
                ),
                [actors.unauthorized.public_key()],
                &actors.unauthorized,
            )
            .unwrap();

        assert_matches!(
            store.init_file("feature", [actors.unauthorized.public_key()], 1, &actors.unauthorized),
            Err(RefguardError::Invalid { .. })
        );
        assert_matches!(
            store.init_file("feature", [], 1, &actors.unauthorized),
            Err(RefguardError::UnauthorizedSigner { .. })
        );
        store.init_file("feature", [], 1, &actors.developer2).unwrap();
        assert_matches!(
            store.add_rule(
                "feature",
                Rule::keys("feature", vec![pattern("git:refs/heads/feature")], [actors.unauthorized.key_id()]),
                [actors.unauthorized.public_key()],
                &actors.unauthorized,
            ),
            Err(RefguardError::UnauthorizedSigner { .. })
        );
        store
            .add_rule(
                "feature",
                Rule::keys("feature", vec![pattern("git:refs/heads/feature")], [actors.developer2.key_id()]),
                [actors.developer2.public_key()],
                &actors.developer2,
            )
            .unwrap();
        store.apply().unwrap();
        let resolution = store.resolve(&Target::reference("feature")).unwrap();
        assert_eq!(resolution.governing().policy, "feature");
    }

    #[test]
    fn test_root_signatures_collected_across_sessions() {
        let repo = MemoryRepository::new();
        let actors = Actors::new();
        let store = PolicyStore::new(&repo);
        store
            .init_root(
                [actors.root.public_key(), actors.developer3.public_key()],
                2,
                &[&actors.root, &actors.developer3],
            )
            .unwrap();
        assert_matches!(store.sign_root(&actors.root), Err(RefguardError::NotFound { .. }));

        let proposed = store
            .update_root(&[RootChange::AddPolicyKey(actors.targets.public_key())], &[&actors.root])
            .unwrap();
        assert_eq!(proposed, RootUpdate::Pending { version: 2, have: 1, need: 2 });
        assert_eq!(store.staged().unwrap().unwrap().roots.len(), 1);

        // a later session picks the proposal up from the repository
        let later = PolicyStore::new(&repo);
        assert_eq!(
            later.sign_root(&actors.unauthorized).unwrap(),
            RootUpdate::Pending { version: 2, have: 1, need: 2 }
        );
        assert_matches!(later.sign_root(&actors.developer3).unwrap(), RootUpdate::Staged(_));
        later.apply().unwrap();
        let active = later.require_active().unwrap();
        assert_eq!(active.roots.len(), 2);
        assert!(active.root().unwrap().policy_keys.contains_key(&actors.targets.key_id()));

        // the activated proposal is spent
        assert_matches!(later.sign_root(&actors.root), Err(RefguardError::NotFound { .. }));
    }

    #[test]
    fn test_policy_key_change_requires_resigning_default() {
        let repo = MemoryRepository::new();
        let actors = Actors::new();
        ready(&repo, &actors, 1, &[]);
        let store = PolicyStore::new(&repo);
        store.init_file(DEFAULT_POLICY, [], 0, &actors.targets).unwrap();
        store.apply().unwrap();

        store
            .update_root(
                &[
                    RootChange::AddPolicyKey(actors.developer1.public_key()),
                    RootChange::RemovePolicyKey(actors.targets.key_id()),
                ],
                &[&actors.root],
            )
            .unwrap();
        assert_matches!(store.apply(), Err(RefguardError::InsufficientSignatures { .. }));
        assert!(store.sign(DEFAULT_POLICY, &actors.developer1).unwrap());
        store.apply().unwrap();
        let active = store.require_active().unwrap();
        assert_eq!(active.roots.len(), 3);
    }
}
