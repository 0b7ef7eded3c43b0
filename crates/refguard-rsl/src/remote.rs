//! Synchronizing the log with another repository
//!
//! Only fast-forwards are performed. Objects move first, then the log tip by
//! compare-and-swap on the receiving side, then every reference named by the
//! newly transferred entries is set to its latest recorded target. A
//! receiving reference that moved past what its log records is never
//! overwritten; the sync fails with `RefConflict` before anything changes.

use refguard_core::{
    transport, ObjectId, RefguardError, Repository, Result, POLICY_REF, POLICY_STAGING_REF,
    RSL_REF,
};
use std::collections::BTreeMap;

use crate::divergence::{detect_divergence, Divergence};
use crate::entry::StoredEntry;
use crate::log::ReferenceStateLog;

/// What a push or pull transferred
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries the receiving side did not have
    pub entries: usize,
    /// References moved on the receiving side
    pub references: Vec<String>,
}

impl SyncReport {
    /// Whether nothing had to be transferred
    pub fn is_up_to_date(&self) -> bool {
        self.entries == 0
    }
}

fn fast_forward<F, T>(
    from: &F,
    to: &T,
    from_log: &ReferenceStateLog,
    to_log: &ReferenceStateLog,
) -> Result<SyncReport>
where
    F: Repository + ?Sized,
    T: Repository + ?Sized,
{
    let Some(tip) = from_log.tip_id() else {
        return Ok(SyncReport::default());
    };
    let new_entries = from_log.entries().get(to_log.len()..).unwrap_or_default();

    let mut latest: BTreeMap<&str, ObjectId> = BTreeMap::new();
    for entry in new_entries {
        latest.insert(entry.reference(), entry.target());
    }
    // a receiving reference may only move from the target its own log records
    let mut moves = Vec::new();
    for (name, target) in latest {
        let current = to.read_ref(name)?;
        if current == Some(target) {
            continue;
        }
        let recorded = to_log.latest_for(name).map(StoredEntry::target);
        if current != recorded {
            return Err(RefguardError::RefConflict {
                reference: name.to_string(),
                expected: describe_target(recorded),
                actual: describe_target(current),
            });
        }
        moves.push((name, target, recorded));
    }
    let policy_before = to.read_ref(POLICY_REF)?;

    transport::copy_objects(from, to)?;
    to.update_ref(RSL_REF, tip, to_log.tip_id())?;

    let mut references = Vec::new();
    for (name, target, recorded) in moves {
        to.update_ref(name, target, recorded)?;
        references.push(name.to_string());
    }
    follow_policy(to, policy_before)?;

    tracing::info!(
        entries = new_entries.len(),
        references = references.len(),
        tip = %tip.short(),
        "reference state log fast-forwarded"
    );
    Ok(SyncReport {
        entries: new_entries.len(),
        references,
    })
}

/// Move an idle staging reference along with the active policy
///
/// Staged edits that were derived from the previous policy stay put; they
/// can no longer be applied and have to be discarded.
fn follow_policy<T: Repository + ?Sized>(to: &T, before: Option<ObjectId>) -> Result<()> {
    let after = to.read_ref(POLICY_REF)?;
    let Some(active) = after else {
        return Ok(());
    };
    if after == before {
        return Ok(());
    }
    let staged = to.read_ref(POLICY_STAGING_REF)?;
    if staged.is_some() && staged == before {
        to.update_ref(POLICY_STAGING_REF, active, staged)?;
        tracing::debug!(state = %active.short(), "policy staging moved to the new active policy");
    } else if staged.is_some() && staged != after {
        tracing::warn!("staged policy changes were based on an older policy, discard them to edit again");
    }
    Ok(())
}

/// Send local entries the remote lacks
///
/// Fails with `HistoryDiverged` if the remote has entries the local log does
/// not; pull first in that case.
pub fn push<L, R>(local: &L, remote: &R) -> Result<SyncReport>
where
    L: Repository + ?Sized,
    R: Repository + ?Sized,
{
    let local_log = ReferenceStateLog::load(local)?;
    let remote_log = ReferenceStateLog::load(remote)?;
    match detect_divergence(&local_log, &remote_log)? {
        Divergence::Equal => Ok(SyncReport::default()),
        Divergence::LocalAhead => fast_forward(local, remote, &local_log, &remote_log),
        Divergence::RemoteAhead => Err(RefguardError::HistoryDiverged {
            local: describe(&local_log),
            remote: describe(&remote_log),
        }),
    }
}

/// Fetch remote entries the local log lacks
///
/// A diverged remote fails with `HistoryDiverged` before anything local
/// changes.
pub fn pull<L, R>(local: &L, remote: &R) -> Result<SyncReport>
where
    L: Repository + ?Sized,
    R: Repository + ?Sized,
{
    let local_log = ReferenceStateLog::load(local)?;
    let remote_log = ReferenceStateLog::load(remote)?;
    match detect_divergence(&local_log, &remote_log)? {
        Divergence::Equal | Divergence::LocalAhead => Ok(SyncReport::default()),
        Divergence::RemoteAhead => fast_forward(remote, local, &remote_log, &local_log),
    }
}

fn describe(log: &ReferenceStateLog) -> String {
    describe_target(log.tip_id())
}

fn describe_target(id: Option<ObjectId>) -> String {
    id.map_or_else(|| "none".to_string(), |id| id.to_hex())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use refguard_core::{transport::clone_repository, MemoryRepository, RefStore};
    use refguard_policy::{PolicyStore, RootChange, Rule, DEFAULT_POLICY};
    use refguard_testkit::{commit_file, key, Actors};

    fn commit_and_record(repo: &MemoryRepository, content: &str) {
        commit_file(repo, "refs/heads/main", "README.md", content, &key("developer1"));
        ReferenceStateLog::record(repo, "main", None).unwrap();
    }

    #[test]
    fn test_push_then_pull_round_trip() {
        let server = MemoryRepository::new();
        commit_and_record(&server, "one");
        let a = MemoryRepository::new();
        let b = MemoryRepository::new();
        clone_repository(&server, &a).unwrap();
        clone_repository(&server, &b).unwrap();

        commit_and_record(&a, "two");
        let pushed = push(&a, &server).unwrap();
        assert_eq!(pushed.entries, 1);
        assert_eq!(pushed.references, vec!["refs/heads/main".to_string()]);
        assert!(push(&a, &server).unwrap().is_up_to_date());

        let pulled = pull(&b, &server).unwrap();
        assert_eq!(pulled.entries, 1);
        assert_eq!(
            b.read_ref("refs/heads/main").unwrap(),
            a.read_ref("refs/heads/main").unwrap()
        );
        assert_eq!(b.read_ref(RSL_REF).unwrap(), a.read_ref(RSL_REF).unwrap());
    }

    #[test]
    fn test_push_onto_newer_remote_is_rejected() {
        let server = MemoryRepository::new();
        commit_and_record(&server, "one");
        let a = MemoryRepository::new();
        clone_repository(&server, &a).unwrap();
        commit_and_record(&server, "two");

        assert_matches!(push(&a, &server), Err(RefguardError::HistoryDiverged { .. }));
        assert!(pull(&a, &server).unwrap().entries == 1);
        assert!(push(&a, &server).unwrap().is_up_to_date());
    }

    #[test]
    fn test_pull_of_diverged_remote_changes_nothing() {
        let server = MemoryRepository::new();
        commit_and_record(&server, "one");
        let a = MemoryRepository::new();
        clone_repository(&server, &a).unwrap();
        commit_and_record(&a, "local");
        commit_and_record(&server, "remote");

        let before_log = a.read_ref(RSL_REF).unwrap();
        let before_main = a.read_ref("refs/heads/main").unwrap();
        assert_matches!(pull(&a, &server), Err(RefguardError::HistoryDiverged { .. }));
        assert_eq!(a.read_ref(RSL_REF).unwrap(), before_log);
        assert_eq!(a.read_ref("refs/heads/main").unwrap(), before_main);
    }

    #[test]
    fn test_pull_keeps_unrecorded_local_commit() {
        let server = MemoryRepository::new();
        commit_and_record(&server, "one");
        let a = MemoryRepository::new();
        clone_repository(&server, &a).unwrap();
        commit_and_record(&server, "two");
        let unrecorded = commit_file(&a, "refs/heads/main", "README.md", "local", &key("developer1"));
        let before_log = a.read_ref(RSL_REF).unwrap();

        let Err(RefguardError::RefConflict { reference, actual, .. }) = pull(&a, &server) else {
            panic!("pull must not overwrite an unrecorded commit");
        };
        assert_eq!(reference, "refs/heads/main");
        assert_eq!(actual, unrecorded.to_hex());
        assert_eq!(a.read_ref("refs/heads/main").unwrap(), Some(unrecorded));
        assert_eq!(a.read_ref(RSL_REF).unwrap(), before_log);
    }

    #[test]
    fn test_push_keeps_unrecorded_remote_commit() {
        let server = MemoryRepository::new();
        commit_and_record(&server, "one");
        let a = MemoryRepository::new();
        clone_repository(&server, &a).unwrap();
        let unrecorded = commit_file(&server, "refs/heads/main", "README.md", "server", &key("developer2"));
        commit_and_record(&a, "two");

        assert_matches!(push(&a, &server), Err(RefguardError::RefConflict { .. }));
        assert_eq!(server.read_ref("refs/heads/main").unwrap(), Some(unrecorded));
        assert_eq!(ReferenceStateLog::load(&server).unwrap().len(), 1);
    }

    #[test]
    fn test_policy_stays_editable_after_pull() {
        let actors = Actors::new();
        let server = MemoryRepository::new();
        let store = PolicyStore::new(&server);
        store.init_root([actors.root.public_key()], 1, &[&actors.root]).unwrap();
        store
            .update_root(&[RootChange::AddPolicyKey(actors.targets.public_key())], &[&actors.root])
            .unwrap();
        store.init_file(DEFAULT_POLICY, [], 0, &actors.targets).unwrap();
        store.apply().unwrap();
        ReferenceStateLog::record(&server, POLICY_REF, None).unwrap();

        let a = MemoryRepository::new();
        clone_repository(&server, &a).unwrap();

        store
            .add_rule(
                DEFAULT_POLICY,
                Rule::keys("main", vec!["git:refs/heads/main".parse().unwrap()], [actors.developer1.key_id()]),
                [actors.developer1.public_key()],
                &actors.targets,
            )
            .unwrap();
        store.apply().unwrap();
        ReferenceStateLog::record(&server, POLICY_REF, None).unwrap();

        pull(&a, &server).unwrap();
        assert_eq!(a.read_ref(POLICY_STAGING_REF).unwrap(), a.read_ref(POLICY_REF).unwrap());

        let local = PolicyStore::new(&a);
        local
            .add_rule(
                DEFAULT_POLICY,
                Rule::keys("feature", vec!["git:refs/heads/feature".parse().unwrap()], [actors.developer2.key_id()]),
                [actors.developer2.public_key()],
                &actors.targets,
            )
            .unwrap();
        local.apply().unwrap();
        assert_eq!(local.list_rules(DEFAULT_POLICY).unwrap().len(), 2);
    }
}
