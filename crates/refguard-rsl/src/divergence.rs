//! Comparing two copies of the log
//!
//! Both logs are already integrity-checked, so an entry with the same number
//! and id in both means everything before it is shared too. One tip is an
//! ancestor of the other exactly when the longer log contains it.

use refguard_core::{RefguardError, Result};

use crate::log::ReferenceStateLog;

/// How two logs relate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    /// Same tip
    Equal,
    /// The local log extends the remote one
    LocalAhead,
    /// The remote log extends the local one
    RemoteAhead,
}

/// Classify `local` against `remote`
///
/// Fails with `HistoryDiverged` when neither tip is an ancestor of the other.
pub fn detect_divergence(
    local: &ReferenceStateLog,
    remote: &ReferenceStateLog,
) -> Result<Divergence> {
    let (local_tip, remote_tip) = match (local.tip(), remote.tip()) {
        (None, None) => return Ok(Divergence::Equal),
        (None, Some(_)) => return Ok(Divergence::RemoteAhead),
        (Some(_), None) => return Ok(Divergence::LocalAhead),
        (Some(l), Some(r)) => (l, r),
    };

    if local_tip.id == remote_tip.id {
        Ok(Divergence::Equal)
    } else if remote.contains(local_tip) {
        Ok(Divergence::RemoteAhead)
    } else if local.contains(remote_tip) {
        Ok(Divergence::LocalAhead)
    } else {
        let shared = local
            .entries()
            .iter()
            .zip(remote.entries())
            .take_while(|(l, r)| l.id == r.id)
            .count();
        tracing::warn!(
            shared,
            local = local.len(),
            remote = remote.len(),
            "reference state logs diverged"
        );
        Err(RefguardError::HistoryDiverged {
            local: local_tip.id.to_hex(),
            remote: remote_tip.id.to_hex(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use refguard_core::{MemoryRepository, ObjectStore};

    #[test]
    fn test_empty_logs() {
        let empty = ReferenceStateLog::empty();
        let repo = MemoryRepository::new();
        let mut one = ReferenceStateLog::empty();
        let target = repo.put_object(b"x").unwrap();
        one.append(&repo, "main", target, None, None).unwrap();

        assert_eq!(detect_divergence(&empty, &empty).unwrap(), Divergence::Equal);
        assert_eq!(detect_divergence(&empty, &one).unwrap(), Divergence::RemoteAhead);
        assert_eq!(detect_divergence(&one, &empty).unwrap(), Divergence::LocalAhead);
    }

    #[test]
    fn test_prefix_relation() {
        let repo = MemoryRepository::new();
        let target = repo.put_object(b"x").unwrap();
        let mut log = ReferenceStateLog::empty();
        let first = log.append(&repo, "main", target, None, None).unwrap();
        let short = log.clone();
        log.append(&repo, "main", target, Some(first), None).unwrap();

        assert_eq!(detect_divergence(&log, &log).unwrap(), Divergence::Equal);
        assert_eq!(detect_divergence(&log, &short).unwrap(), Divergence::LocalAhead);
        assert_eq!(detect_divergence(&short, &log).unwrap(), Divergence::RemoteAhead);
    }

    #[test]
    fn test_rewound_history_diverges_both_ways() {
        let a = MemoryRepository::new();
        let b = MemoryRepository::new();
        let one = a.put_object(b"one").unwrap();
        let two = b.put_object(b"two").unwrap();

        let mut left = ReferenceStateLog::empty();
        let genesis = left.append(&a, "main", one, None, None).unwrap();
        refguard_core::transport::clone_repository(&a, &b).unwrap();
        let mut right = ReferenceStateLog::load(&b).unwrap();

        left.append(&a, "main", one, Some(genesis), None).unwrap();
        right.append(&b, "main", two, Some(genesis), None).unwrap();

        assert_matches!(
            detect_divergence(&left, &right),
            Err(RefguardError::HistoryDiverged { .. })
        );
        assert_matches!(
            detect_divergence(&right, &left),
            Err(RefguardError::HistoryDiverged { .. })
        );
    }
}
