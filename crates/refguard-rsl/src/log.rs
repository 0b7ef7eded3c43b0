//! The reference state log
//!
//! Entries are stored as objects and linked backwards by id; the tip is named
//! by [`RSL_REF`]. In memory the log is an arena indexed by `number - 1`, so
//! the entry numbered `n` is always `entries[n - 1]`.
//!
//! Loading walks from the tip to genesis and rejects any gap: a missing or
//! altered object, a number that does not decrease by exactly one, or a
//! genesis entry that links further back.

use refguard_core::{
    absolute_ref_name, Envelope, ObjectId, ObjectStoreExt, RefguardError, Repository, Result,
    SigningKey, RSL_REF,
};

use crate::entry::{RslEntry, SignedEntry, StoredEntry};

fn describe(id: Option<ObjectId>) -> String {
    id.map_or_else(|| "none".to_string(), |id| id.to_hex())
}

/// A loaded, integrity-checked log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceStateLog {
    entries: Vec<StoredEntry>,
}

impl ReferenceStateLog {
    /// A log with no entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the log `repo` currently points at
    pub fn load<R: Repository + ?Sized>(repo: &R) -> Result<Self> {
        Self::load_from(repo, repo.read_ref(RSL_REF)?)
    }

    /// Load the log ending at `tip`
    pub fn load_from<R: Repository + ?Sized>(repo: &R, tip: Option<ObjectId>) -> Result<Self> {
        let mut entries = Vec::new();
        let mut cursor = tip;
        let mut expected: Option<u64> = None;

        while let Some(id) = cursor {
            let bytes = repo.get_object(&id).map_err(|e| match e {
                RefguardError::NotFound { .. } => {
                    RefguardError::chain_broken(format!("entry {} is missing", id.short()))
                }
                other => other,
            })?;
            if ObjectId::for_bytes(&bytes) != id {
                return Err(RefguardError::chain_broken(format!(
                    "entry {} does not match its id",
                    id.short()
                )));
            }
            let entry: SignedEntry = serde_json::from_slice(&bytes)?;
            let payload = entry.payload();

            if let Some(expected) = expected {
                if payload.number != expected {
                    return Err(RefguardError::chain_broken(format!(
                        "entry {} is numbered {}, expected {expected}",
                        id.short(),
                        payload.number
                    )));
                }
            }
            match (payload.number, payload.previous) {
                (0, _) => {
                    return Err(RefguardError::chain_broken(format!(
                        "entry {} is numbered 0",
                        id.short()
                    )))
                }
                (1, Some(_)) => {
                    return Err(RefguardError::chain_broken(
                        "genesis entry links to a predecessor",
                    ))
                }
                (n, None) if n != 1 => {
                    return Err(RefguardError::chain_broken(format!(
                        "entry {n} has no predecessor"
                    )))
                }
                _ => {}
            }

            expected = Some(payload.number - 1);
            cursor = payload.previous;
            entries.push(StoredEntry { id, entry });
        }

        entries.reverse();
        tracing::debug!(entries = entries.len(), tip = %describe(tip), "reference state log loaded");
        Ok(Self { entries })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, genesis first
    pub fn entries(&self) -> &[StoredEntry] {
        &self.entries
    }

    /// Latest entry
    pub fn tip(&self) -> Option<&StoredEntry> {
        self.entries.last()
    }

    /// Id of the latest entry
    pub fn tip_id(&self) -> Option<ObjectId> {
        self.tip().map(|e| e.id)
    }

    /// Entry numbered `number`
    pub fn get(&self, number: u64) -> Option<&StoredEntry> {
        let index = usize::try_from(number.checked_sub(1)?).ok()?;
        self.entries.get(index)
    }

    /// Whether `entry` (same number, same id) is part of this log
    pub fn contains(&self, entry: &StoredEntry) -> bool {
        self.get(entry.number()).is_some_and(|e| e.id == entry.id)
    }

    /// Entries recording `reference`, genesis first
    pub fn entries_for<'a>(&'a self, reference: &str) -> impl Iterator<Item = &'a StoredEntry> + 'a {
        let reference = absolute_ref_name(reference);
        self.entries.iter().filter(move |e| e.reference() == reference)
    }

    /// Latest entry recording `reference`
    pub fn latest_for(&self, reference: &str) -> Option<&StoredEntry> {
        let reference = absolute_ref_name(reference);
        self.entries.iter().rev().find(|e| e.reference() == reference)
    }

    /// Record `target` for `reference` on top of `preceding`
    ///
    /// `preceding` must be the current tip, both in this log and in the
    /// repository, otherwise the append is a fork. The tip reference moves by
    /// compare-and-swap.
    pub fn append<R: Repository + ?Sized>(
        &mut self,
        repo: &R,
        reference: &str,
        target: ObjectId,
        preceding: Option<ObjectId>,
        signer: Option<&SigningKey>,
    ) -> Result<ObjectId> {
        let stored_tip = repo.read_ref(RSL_REF)?;
        if preceding != self.tip_id() || preceding != stored_tip {
            return Err(RefguardError::ForkDetected {
                expected: describe(preceding),
                actual: describe(stored_tip),
            });
        }

        let entry = RslEntry {
            number: self.entries.len() as u64 + 1,
            reference: absolute_ref_name(reference),
            target,
            previous: preceding,
        };
        let mut signed = Envelope::new(entry);
        if let Some(key) = signer {
            signed = signed.sign(key)?;
        }
        let id = repo.put_json(&signed)?;
        repo.update_ref(RSL_REF, id, preceding).map_err(|e| match e {
            RefguardError::RefConflict { actual, .. } => RefguardError::ForkDetected {
                expected: describe(preceding),
                actual,
            },
            other => other,
        })?;

        tracing::info!(
            number = signed.payload().number,
            reference = %signed.payload().reference,
            target = %target.short(),
            entry = %id.short(),
            "recorded reference state"
        );
        self.entries.push(StoredEntry { id, entry: signed });
        Ok(id)
    }

    /// Record the current value of `reference` on top of the stored tip
    pub fn record<R: Repository + ?Sized>(
        repo: &R,
        reference: &str,
        signer: Option<&SigningKey>,
    ) -> Result<ObjectId> {
        let reference = absolute_ref_name(reference);
        let target = repo
            .read_ref(&reference)?
            .ok_or_else(|| RefguardError::not_found(format!("reference {reference}")))?;
        let mut log = Self::load(repo)?;
        let tip = log.tip_id();
        log.append(repo, &reference, target, tip, signer)
    }
}
