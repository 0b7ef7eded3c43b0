// Reference state log commands

use anyhow::Result;
use refguard_rsl::{pull, push, ReferenceStateLog, SyncReport};
use refguard_verify::record_reference;
use std::path::PathBuf;

use crate::workspace::Workspace;

#[derive(clap::Subcommand)]
pub enum RslSubcommand {
    /// Record the current value of a reference
    Record {
        /// Reference to record
        reference: String,
        /// Key to sign the entry with
        #[arg(short = 'k', long)]
        signing_key: Option<PathBuf>,
    },
    /// Show the log, newest first
    Log,
    /// Exchange log entries with a remote
    Remote {
        #[command(subcommand)]
        command: RemoteSubcommand,
    },
}

#[derive(clap::Subcommand)]
pub enum RemoteSubcommand {
    /// Send local entries and the references they record
    Push {
        /// Remote name or directory
        remote: String,
    },
    /// Fetch remote entries and the references they record
    Pull {
        /// Remote name or directory
        remote: String,
    },
}

fn report(direction: &str, remote: &str, report: &SyncReport) {
    if report.is_up_to_date() {
        println!("Already up to date with {remote}");
        return;
    }
    println!("{direction} {} entries ({remote})", report.entries);
    for reference in &report.references {
        println!("  updated {reference}");
    }
}

pub fn handle_rsl_command(workspace: &Workspace, subcommand: &RslSubcommand) -> Result<()> {
    match subcommand {
        RslSubcommand::Record {
            reference,
            signing_key,
        } => {
            let signer = workspace.optional_signing_key(signing_key.as_deref())?;
            record_reference(&workspace.repo, reference, signer.as_ref())?;
            let log = ReferenceStateLog::load(&workspace.repo)?;
            if let Some(tip) = log.tip() {
                println!("Recorded {} as entry {}", tip.reference(), tip.number());
            }
        }
        RslSubcommand::Log => {
            let log = ReferenceStateLog::load(&workspace.repo)?;
            for entry in log.entries().iter().rev() {
                println!(
                    "{:>4} {} {} -> {}",
                    entry.number(),
                    entry.id.short(),
                    entry.reference(),
                    entry.target().short()
                );
            }
        }
        RslSubcommand::Remote { command } => match command {
            RemoteSubcommand::Push { remote } => {
                let remote_repo = workspace.open_remote(remote)?;
                report("Pushed", remote, &push(&workspace.repo, &remote_repo)?);
            }
            RemoteSubcommand::Pull { remote } => {
                let remote_repo = workspace.open_remote(remote)?;
                report("Pulled", remote, &pull(&workspace.repo, &remote_repo)?);
            }
        },
    }
    Ok(())
}
