// Root of trust commands

use anyhow::Result;
use refguard_core::SigningKey;
use refguard_policy::{PolicyStore, RootChange, RootUpdate};
use std::path::PathBuf;

use crate::workspace::{key_id, read_public_key, read_signing_key, Workspace};

#[derive(clap::Subcommand)]
pub enum TrustSubcommand {
    /// Create root version 1
    Init {
        /// Root signing key (repeat for several)
        #[arg(short = 'k', long = "signing-key")]
        signing_keys: Vec<PathBuf>,
        /// Further root public keys
        #[arg(long = "root-key")]
        root_keys: Vec<PathBuf>,
        /// Root signatures required for the next root version
        #[arg(long, default_value_t = 1)]
        threshold: usize,
    },
    /// Trust an additional root key
    AddRootKey {
        /// Current root signing keys
        #[arg(short = 'k', long = "signing-key")]
        signing_keys: Vec<PathBuf>,
        /// Public key to add
        #[arg(long)]
        root_key: PathBuf,
    },
    /// Stop trusting a root key
    RemoveRootKey {
        /// Current root signing keys
        #[arg(short = 'k', long = "signing-key")]
        signing_keys: Vec<PathBuf>,
        /// Key file or fingerprint
        #[arg(long)]
        root_key: String,
    },
    /// Change the root threshold
    UpdateRootThreshold {
        /// Current root signing keys
        #[arg(short = 'k', long = "signing-key")]
        signing_keys: Vec<PathBuf>,
        /// New threshold
        #[arg(long)]
        threshold: usize,
    },
    /// Trust a key to sign the default policy
    AddPolicyKey {
        /// Current root signing keys
        #[arg(short = 'k', long = "signing-key")]
        signing_keys: Vec<PathBuf>,
        /// Public key to add
        #[arg(long)]
        policy_key: PathBuf,
    },
    /// Stop trusting a policy key
    RemovePolicyKey {
        /// Current root signing keys
        #[arg(short = 'k', long = "signing-key")]
        signing_keys: Vec<PathBuf>,
        /// Key file or fingerprint
        #[arg(long)]
        policy_key: String,
    },
    /// Change the number of policy keys that must sign the default policy
    UpdatePolicyThreshold {
        /// Current root signing keys
        #[arg(short = 'k', long = "signing-key")]
        signing_keys: Vec<PathBuf>,
        /// New threshold
        #[arg(long)]
        threshold: usize,
    },
    /// Add root signatures to the pending root update
    Sign {
        /// Root signing keys
        #[arg(short = 'k', long = "signing-key")]
        signing_keys: Vec<PathBuf>,
    },
}

fn root_signers(workspace: &Workspace, paths: &[PathBuf]) -> Result<Vec<SigningKey>> {
    if paths.is_empty() {
        return Ok(vec![workspace.signing_key(None)?]);
    }
    paths.iter().map(|p| read_signing_key(p)).collect()
}

pub fn handle_trust_command(workspace: &Workspace, subcommand: &TrustSubcommand) -> Result<()> {
    let store = PolicyStore::new(&workspace.repo);
    let (signing_keys, change) = match subcommand {
        TrustSubcommand::Init {
            signing_keys,
            root_keys,
            threshold,
        } => {
            let signers = root_signers(workspace, signing_keys)?;
            let mut keys: Vec<_> = signers.iter().map(SigningKey::public_key).collect();
            for path in root_keys {
                keys.push(read_public_key(path)?);
            }
            let refs: Vec<&SigningKey> = signers.iter().collect();
            let staged = store.init_root(keys, *threshold, &refs)?;
            println!("Staged root of trust ({})", staged.short());
            println!("Run 'refguard policy apply' to activate it");
            return Ok(());
        }
        TrustSubcommand::AddRootKey {
            signing_keys,
            root_key,
        } => (signing_keys, RootChange::AddRootKey(read_public_key(root_key)?)),
        TrustSubcommand::RemoveRootKey {
            signing_keys,
            root_key,
        } => (signing_keys, RootChange::RemoveRootKey(key_id(root_key)?)),
        TrustSubcommand::UpdateRootThreshold {
            signing_keys,
            threshold,
        } => (signing_keys, RootChange::SetRootThreshold(*threshold)),
        TrustSubcommand::AddPolicyKey {
            signing_keys,
            policy_key,
        } => (signing_keys, RootChange::AddPolicyKey(read_public_key(policy_key)?)),
        TrustSubcommand::RemovePolicyKey {
            signing_keys,
            policy_key,
        } => (signing_keys, RootChange::RemovePolicyKey(key_id(policy_key)?)),
        TrustSubcommand::UpdatePolicyThreshold {
            signing_keys,
            threshold,
        } => (signing_keys, RootChange::SetPolicyThreshold(*threshold)),
        TrustSubcommand::Sign { signing_keys } => {
            let mut update = None;
            for key in root_signers(workspace, signing_keys)? {
                let next = store.sign_root(&key)?;
                update = Some(next);
                if matches!(next, RootUpdate::Staged(_)) {
                    break;
                }
            }
            if let Some(update) = update {
                report(update);
            }
            return Ok(());
        }
    };

    let signers = root_signers(workspace, signing_keys)?;
    let refs: Vec<&SigningKey> = signers.iter().collect();
    report(store.update_root(&[change], &refs)?);
    Ok(())
}

fn report(update: RootUpdate) {
    match update {
        RootUpdate::Staged(staged) => {
            println!("Staged root update ({})", staged.short());
            println!("Run 'refguard policy apply' to activate it");
        }
        RootUpdate::Pending {
            version,
            have,
            need,
        } => {
            println!("Root version {version} has {have} of {need} required root signatures");
            println!("Run 'refguard trust sign' with further root keys to complete it");
        }
    }
}
