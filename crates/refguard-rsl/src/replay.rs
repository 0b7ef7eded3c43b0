//! Replaying the log against policy
//!
//! The log is walked from genesis. Entries for [`POLICY_REF`] move the active
//! policy forward; each must carry a valid state whose root history extends
//! the previous one. Entries for the reference under review are checked
//! against whatever policy is active at that point: the reference rule on the
//! recorded commit's signatures, plus the rules for every path the commit
//! changed since the reference's previous entry.
//!
//! Replay stops at the first violation; later entries may build on it.

use refguard_core::{
    absolute_ref_name, changed_paths, Commit, ObjectId, RefguardError, Repository, Result,
    POLICY_REF,
};
use refguard_policy::{Evaluator, PolicyState, Target};
use std::collections::BTreeMap;
use std::fmt;

use crate::entry::StoredEntry;
use crate::log::ReferenceStateLog;

/// Why an entry failed verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViolationReason {
    /// The recorded change is not authorized by the active policy
    #[error("unauthorized change to {target}: {reason}")]
    Unauthorized {
        /// Reference or path that was denied
        target: String,
        /// Evaluator explanation
        reason: String,
    },

    /// The entry precedes any applied policy
    #[error("no policy was active when this entry was recorded")]
    NoActivePolicy,

    /// A policy entry does not carry a valid successor state
    #[error("invalid policy state: {reason}")]
    InvalidPolicy {
        /// Validation failure
        reason: String,
    },

    /// The recorded commit cannot be read
    #[error("unreadable change {target}: {reason}")]
    UnreadableChange {
        /// Recorded object id
        target: String,
        /// Load failure
        reason: String,
    },

    /// The reference no longer points where the log says it does
    #[error("reference points at {actual}, but the log records {recorded}")]
    StateMismatch {
        /// Target of the latest entry
        recorded: String,
        /// Current value of the reference
        actual: String,
    },
}

/// A failed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Number of the offending entry
    pub entry_number: u64,
    /// Id of the offending entry
    pub entry_id: ObjectId,
    /// Reference the entry records
    pub reference: String,
    /// What went wrong
    pub reason: ViolationReason,
}

impl Violation {
    /// Violation of `entry` for `reason`
    pub fn at(entry: &StoredEntry, reason: ViolationReason) -> Self {
        Self {
            entry_number: entry.number(),
            entry_id: entry.id,
            reference: entry.reference().to_string(),
            reason,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entry {} ({}) for {}: {}",
            self.entry_number,
            self.entry_id.short(),
            self.reference,
            self.reason
        )
    }
}

/// Result of verifying a reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Every entry checked out
    Authorized,
    /// The first entry that did not
    Violation(Violation),
}

impl Outcome {
    /// Whether verification passed
    pub fn is_authorized(&self) -> bool {
        matches!(self, Outcome::Authorized)
    }
}

fn policy_violation(error: &RefguardError) -> ViolationReason {
    ViolationReason::InvalidPolicy {
        reason: error.to_string(),
    }
}

/// Load and validate the policy state a policy entry records
pub fn check_policy_entry<R: Repository + ?Sized>(
    repo: &R,
    target: &ObjectId,
    previous: Option<&PolicyState>,
) -> std::result::Result<PolicyState, ViolationReason> {
    let state = PolicyState::load(repo, target).map_err(|e| policy_violation(&e))?;
    state.validate().map_err(|e| policy_violation(&e))?;
    if let Some(previous) = previous {
        state
            .validate_successor_of(previous)
            .map_err(|e| policy_violation(&e))?;
    }
    Ok(state)
}

/// Check one recorded change of `reference` against `state`
pub fn check_change<R: Repository + ?Sized>(
    repo: &R,
    state: &PolicyState,
    reference: &str,
    target: &ObjectId,
    previous_target: Option<&ObjectId>,
) -> std::result::Result<(), ViolationReason> {
    let unreadable = |e: RefguardError| ViolationReason::UnreadableChange {
        target: target.to_hex(),
        reason: e.to_string(),
    };
    let commit = Commit::load(repo, target).map_err(unreadable)?;
    let payload = commit.signing_bytes().map_err(unreadable)?;
    let evaluator = Evaluator::new(state);

    let denied = |e: RefguardError| match e {
        RefguardError::Unauthorized { target, reason } => {
            ViolationReason::Unauthorized { target, reason }
        }
        other => policy_violation(&other),
    };

    let authorization = evaluator
        .authorize(&Target::Ref(reference.to_string()), &payload, commit.signatures())
        .map_err(denied)?;
    tracing::debug!(
        reference,
        rule = %authorization.rule,
        signer = %authorization.signer.short(),
        "reference change authorized"
    );

    let before = match previous_target {
        Some(id) => Commit::load(repo, id).map_err(unreadable)?.into_payload().tree,
        None => BTreeMap::new(),
    };
    for path in changed_paths(&before, &commit.payload().tree) {
        if let Some(authorization) = evaluator
            .authorize_path(&Target::Path(path.clone()), &payload, commit.signatures())
            .map_err(denied)?
        {
            tracing::debug!(path = %path, rule = %authorization.rule, "path change authorized");
        }
    }
    Ok(())
}

/// Walk `log` and check every entry of `reference`
///
/// When `reference` is [`POLICY_REF`] its entries are the policy states
/// themselves and are checked as such.
pub fn verify_reference<R: Repository + ?Sized>(
    repo: &R,
    log: &ReferenceStateLog,
    reference: &str,
) -> Result<Outcome> {
    let reference = absolute_ref_name(reference);
    let mut policy: Option<PolicyState> = None;
    let mut last_target: BTreeMap<&str, ObjectId> = BTreeMap::new();

    for entry in log.entries() {
        let recorded = entry.reference();
        let target = entry.target();

        if recorded == POLICY_REF {
            match check_policy_entry(repo, &target, policy.as_ref()) {
                Ok(state) => policy = Some(state),
                Err(reason) => return Ok(Outcome::Violation(Violation::at(entry, reason))),
            }
        } else if recorded == reference {
            let Some(state) = policy.as_ref() else {
                return Ok(Outcome::Violation(Violation::at(
                    entry,
                    ViolationReason::NoActivePolicy,
                )));
            };
            if let Err(reason) =
                check_change(repo, state, recorded, &target, last_target.get(recorded))
            {
                return Ok(Outcome::Violation(Violation::at(entry, reason)));
            }
        }

        tracing::trace!(number = entry.number(), reference = recorded, "entry checked");
        last_target.insert(recorded, target);
    }

    Ok(Outcome::Authorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use refguard_core::{Envelope, MemoryRepository, ObjectStore, RefStore};
    use refguard_policy::{PolicyStore, RootChange, Rule, DEFAULT_POLICY};
    use refguard_testkit::{commit_file, Actors};

    /// Policy: main is writable by `authorized`, docs/* by developer1 only
    fn protected_repo(actors: &Actors) -> MemoryRepository {
        let repo = MemoryRepository::new();
        let store = PolicyStore::new(&repo);
        store.init_root([actors.root.public_key()], 1, &[&actors.root]).unwrap();
        store
            .update_root(&[RootChange::AddPolicyKey(actors.targets.public_key())], &[&actors.root])
            .unwrap();
        store.init_file(DEFAULT_POLICY, [], 0, &actors.targets).unwrap();
        store
            .add_rule(
                DEFAULT_POLICY,
                Rule::keys(
                    "protect-docs",
                    vec!["file:docs/*".parse().unwrap()],
                    [actors.developer1.key_id()],
                ),
                [actors.developer1.public_key()],
                &actors.targets,
            )
            .unwrap();
        store
            .add_rule(
                DEFAULT_POLICY,
                Rule::keys(
                    "protect-main",
                    vec!["git:refs/heads/main".parse().unwrap()],
                    [actors.authorized.key_id(), actors.developer1.key_id()],
                ),
                [actors.authorized.public_key()],
                &actors.targets,
            )
            .unwrap();
        store.apply().unwrap();
        ReferenceStateLog::record(&repo, POLICY_REF, None).unwrap();
        repo
    }

    fn commit_and_record(repo: &MemoryRepository, path: &str, key: &refguard_core::SigningKey) {
        commit_file(repo, "refs/heads/main", path, "content", key);
        ReferenceStateLog::record(repo, "main", None).unwrap();
    }

    #[test]
    fn test_authorized_history_verifies_and_is_idempotent() {
        let actors = Actors::new();
        let repo = protected_repo(&actors);
        commit_and_record(&repo, "README.md", &actors.authorized);
        commit_and_record(&repo, "docs/guide.md", &actors.developer1);

        let log = ReferenceStateLog::load(&repo).unwrap();
        let first = verify_reference(&repo, &log, "main").unwrap();
        assert_eq!(first, Outcome::Authorized);
        assert_eq!(verify_reference(&repo, &log, "main").unwrap(), first);
        assert!(verify_reference(&repo, &log, POLICY_REF).unwrap().is_authorized());
    }

    #[test]
    fn test_unauthorized_signer_names_entry() {
        let actors = Actors::new();
        let repo = protected_repo(&actors);
        commit_and_record(&repo, "README.md", &actors.authorized);
        commit_and_record(&repo, "README.md", &actors.unauthorized);
        commit_and_record(&repo, "README.md", &actors.authorized);

        let log = ReferenceStateLog::load(&repo).unwrap();
        let Outcome::Violation(violation) = verify_reference(&repo, &log, "main").unwrap() else {
            panic!("expected a violation");
        };
        assert_eq!(violation.entry_number, 3);
        assert_eq!(violation.reference, "refs/heads/main");
        assert!(matches!(violation.reason, ViolationReason::Unauthorized { .. }));
    }

    #[test]
    fn test_malformed_signer_id_is_a_violation() {
        let actors = Actors::new();
        let repo = protected_repo(&actors);
        let honest = commit_file(&repo, "refs/heads/main", "README.md", "content", &actors.authorized);
        let mut crafted = serde_json::to_value(Commit::load(&repo, &honest).unwrap()).unwrap();
        crafted["signatures"][0]["key_id"] = serde_json::json!("a\u{20ac}\u{20ac}\u{20ac}\u{20ac}\u{20ac}");
        let crafted = repo.put_object(&serde_json::to_vec(&crafted).unwrap()).unwrap();
        repo.update_ref("refs/heads/main", crafted, Some(honest)).unwrap();
        ReferenceStateLog::record(&repo, "main", None).unwrap();

        let log = ReferenceStateLog::load(&repo).unwrap();
        let Outcome::Violation(violation) = verify_reference(&repo, &log, "main").unwrap() else {
            panic!("expected a violation");
        };
        assert_eq!(violation.entry_number, 2);
        assert!(matches!(violation.reason, ViolationReason::Unauthorized { .. }));
    }

    #[test]
    fn test_protected_path_needs_path_signer() {
        let actors = Actors::new();
        let repo = protected_repo(&actors);
        commit_and_record(&repo, "docs/guide.md", &actors.authorized);

        let log = ReferenceStateLog::load(&repo).unwrap();
        let Outcome::Violation(violation) = verify_reference(&repo, &log, "main").unwrap() else {
            panic!("expected a violation");
        };
        assert_eq!(violation.entry_number, 2);
        let ViolationReason::Unauthorized { target, .. } = violation.reason else {
            panic!("expected an authorization failure");
        };
        assert_eq!(target, "file:docs/guide.md");
    }

    #[test]
    fn test_entries_before_policy_are_unauthorized() {
        let actors = Actors::new();
        let repo = MemoryRepository::new();
        commit_and_record(&repo, "README.md", &actors.authorized);
        let log = ReferenceStateLog::load(&repo).unwrap();
        let Outcome::Violation(violation) = verify_reference(&repo, &log, "main").unwrap() else {
            panic!("expected a violation");
        };
        assert_eq!(violation.entry_number, 1);
        assert_eq!(violation.reason, ViolationReason::NoActivePolicy);
    }

    #[test]
    fn test_forged_policy_entry_is_a_violation() {
        let actors = Actors::new();
        let repo = protected_repo(&actors);
        let mut state = PolicyStore::new(&repo).require_active().unwrap();
        let default = state.files.remove(DEFAULT_POLICY).unwrap().into_payload();
        state
            .files
            .insert(DEFAULT_POLICY.into(), Envelope::new(default).sign(&actors.unauthorized).unwrap());
        let forged = state.store(&repo).unwrap();

        let mut log = ReferenceStateLog::load(&repo).unwrap();
        let tip = log.tip_id();
        log.append(&repo, POLICY_REF, forged, tip, None).unwrap();

        let Outcome::Violation(violation) = verify_reference(&repo, &log, POLICY_REF).unwrap() else {
            panic!("expected a violation");
        };
        assert_eq!(violation.entry_number, 2);
        assert!(matches!(violation.reason, ViolationReason::InvalidPolicy { .. }));
    }
}
