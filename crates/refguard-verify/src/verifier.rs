//! Reference verification
//!
//! `verify_ref` answers one question: can the current value of a reference be
//! trusted? The log must load without gaps, every policy state it records
//! must be valid and extend its predecessor, every recorded change of the
//! reference must be authorized by the policy active when it was recorded,
//! and the reference must still point where its latest entry says.

use refguard_core::{absolute_ref_name, RefguardError, Repository, Result};
use refguard_rsl::{verify_reference, Outcome, ReferenceStateLog, Violation, ViolationReason};

/// Verifies references of one repository
pub struct Verifier<'r, R: Repository + ?Sized> {
    repo: &'r R,
}

impl<'r, R: Repository + ?Sized> Verifier<'r, R> {
    /// Verifier over `repo`
    pub fn new(repo: &'r R) -> Self {
        Self { repo }
    }

    /// Verify the full recorded history of `reference`
    ///
    /// Integrity failures of the log itself are errors (`ChainBroken`); policy
    /// failures are reported as an [`Outcome::Violation`] naming the first
    /// offending entry.
    pub fn verify_ref(&self, reference: &str) -> Result<Outcome> {
        let reference = absolute_ref_name(reference);
        let log = ReferenceStateLog::load(self.repo)?;
        let Some(latest) = log.latest_for(&reference) else {
            return Err(RefguardError::not_found(format!(
                "no reference state log entries for {reference}"
            )));
        };

        tracing::debug!(reference = %reference, entries = log.len(), "verifying reference");
        let outcome = verify_reference(self.repo, &log, &reference)?;
        if let Outcome::Violation(violation) = &outcome {
            tracing::warn!(%violation, "verification failed");
            return Ok(outcome);
        }

        let current = self.repo.read_ref(&reference)?;
        if current != Some(latest.target()) {
            let violation = Violation::at(
                latest,
                ViolationReason::StateMismatch {
                    recorded: latest.target().to_hex(),
                    actual: current.map_or_else(|| "nothing".to_string(), |id| id.to_hex()),
                },
            );
            tracing::warn!(%violation, "verification failed");
            return Ok(Outcome::Violation(violation));
        }

        tracing::info!(reference = %reference, "reference verified");
        Ok(Outcome::Authorized)
    }
}
