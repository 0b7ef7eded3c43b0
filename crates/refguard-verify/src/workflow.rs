//! Write paths that span the policy store and the log

use refguard_core::{Repository, Result, SigningKey, POLICY_REF};
use refguard_policy::{Applied, PolicyStore};
use refguard_rsl::ReferenceStateLog;

/// Apply the staged policy and record the new state in the log
///
/// The policy reference is updated first; if recording then fails, the
/// next successful `record` of the policy reference captures it.
pub fn apply_policy<R: Repository + ?Sized>(
    repo: &R,
    signer: Option<&SigningKey>,
) -> Result<Applied> {
    let applied = PolicyStore::new(repo).apply()?;
    let entry = ReferenceStateLog::record(repo, POLICY_REF, signer)?;
    tracing::info!(
        state = %applied.state.short(),
        entry = %entry.short(),
        "policy applied and recorded"
    );
    Ok(applied)
}

/// Record the current value of `reference` in the log
pub fn record_reference<R: Repository + ?Sized>(
    repo: &R,
    reference: &str,
    signer: Option<&SigningKey>,
) -> Result<()> {
    ReferenceStateLog::record(repo, reference, signer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use refguard_core::{MemoryRepository, RefStore, RefguardError};
    use refguard_testkit::Actors;

    #[test]
    fn test_apply_records_policy_entry() {
        let repo = MemoryRepository::new();
        let actors = Actors::new();
        let store = PolicyStore::new(&repo);
        store.init_root([actors.root.public_key()], 1, &[&actors.root]).unwrap();

        let applied = apply_policy(&repo, None).unwrap();
        let log = ReferenceStateLog::load(&repo).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.tip().unwrap().reference(), POLICY_REF);
        assert_eq!(log.tip().unwrap().target(), applied.state);
        assert_eq!(repo.read_ref(POLICY_REF).unwrap(), Some(applied.state));
    }

    #[test]
    fn test_failed_apply_records_nothing() {
        let repo = MemoryRepository::new();
        assert_matches!(apply_policy(&repo, None), Err(RefguardError::NotFound { .. }));
        assert!(ReferenceStateLog::load(&repo).unwrap().is_empty());
    }
}
