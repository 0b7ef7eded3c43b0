// Reference verification command

use anyhow::Result;
use refguard_verify::{Outcome, Verifier};
use std::process::ExitCode;

use crate::workspace::Workspace;

pub fn verify_ref(workspace: &Workspace, reference: &str) -> Result<ExitCode> {
    match Verifier::new(&workspace.repo).verify_ref(reference)? {
        Outcome::Authorized => {
            println!("{reference}: verified");
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Violation(violation) => {
            eprintln!(
                "{}: verification failed at entry {}",
                violation.reference, violation.entry_number
            );
            eprintln!("  {}", violation.reason);
            Ok(ExitCode::from(1))
        }
    }
}
