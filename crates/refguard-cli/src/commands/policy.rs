// Policy management commands

use anyhow::{bail, Result};
use refguard_policy::{Authority, Pattern, PolicyStore, Rule, Target, DEFAULT_POLICY};
use refguard_verify::apply_policy;
use std::path::PathBuf;

use crate::workspace::{read_public_key, Workspace};

#[derive(clap::Subcommand)]
pub enum PolicySubcommand {
    /// Create a policy file
    Init {
        /// Policy file to create
        #[arg(long, default_value = DEFAULT_POLICY)]
        policy_name: String,
        /// Signing key
        #[arg(short = 'k', long)]
        signing_key: Option<PathBuf>,
        /// Keys allowed to sign the file (defaults to the delegation's pinned
        /// signers, or the signing key)
        #[arg(long = "signer")]
        signers: Vec<PathBuf>,
        /// Signatures the file needs
        #[arg(long, default_value_t = 1)]
        threshold: usize,
    },
    /// Add a signature to a policy file
    Sign {
        /// Policy file to sign
        #[arg(long, default_value = DEFAULT_POLICY)]
        policy_name: String,
        /// Signing key
        #[arg(short = 'k', long)]
        signing_key: Option<PathBuf>,
    },
    /// Append a rule to a policy file
    AddRule {
        /// Policy file to edit
        #[arg(long, default_value = DEFAULT_POLICY)]
        policy_name: String,
        /// Signing key
        #[arg(short = 'k', long)]
        signing_key: Option<PathBuf>,
        /// Rule name, unique within the file
        #[arg(long)]
        rule_name: String,
        /// Target pattern such as git:refs/heads/main or file:src/* (repeatable)
        #[arg(long = "rule-pattern", required = true)]
        patterns: Vec<String>,
        /// Public key to authorize (repeatable)
        #[arg(long = "authorize")]
        authorize: Vec<PathBuf>,
        /// Delegate to this policy file instead; --authorize then names its signers
        #[arg(long)]
        delegate: Option<String>,
        /// Signatures the delegated file needs
        #[arg(long, default_value_t = 1)]
        threshold: usize,
    },
    /// Remove a rule from a policy file
    RemoveRule {
        /// Policy file to edit
        #[arg(long, default_value = DEFAULT_POLICY)]
        policy_name: String,
        /// Signing key
        #[arg(short = 'k', long)]
        signing_key: Option<PathBuf>,
        /// Rule to remove
        #[arg(long)]
        rule_name: String,
    },
    /// Show the rules of a policy file
    ListRules {
        /// Policy file to show
        #[arg(long, default_value = DEFAULT_POLICY)]
        policy_name: String,
    },
    /// Activate the staged policy and record it
    Apply {
        /// Key to sign the log entry with
        #[arg(short = 'k', long)]
        signing_key: Option<PathBuf>,
    },
    /// Drop staged policy changes
    Discard,
    /// Show which rule governs a target under the active policy
    Resolve {
        /// git:<ref> or file:<path>; bare names are references
        target: String,
    },
}

fn parse_target(target: &str) -> Target {
    match target.split_once(':') {
        Some(("file", path)) => Target::path(path),
        Some(("git", name)) => Target::reference(name),
        _ => Target::reference(target),
    }
}

fn describe_authority(authority: &Authority) -> String {
    match authority {
        Authority::Keys { keys } => {
            let keys: Vec<&str> = keys.iter().map(|k| k.short()).collect();
            format!("keys [{}]", keys.join(", "))
        }
        Authority::Delegate {
            policy,
            signers,
            threshold,
        } => format!(
            "delegates to '{policy}' ({threshold} of {} signers)",
            signers.len()
        ),
    }
}

pub fn handle_policy_command(workspace: &Workspace, subcommand: &PolicySubcommand) -> Result<()> {
    let store = PolicyStore::new(&workspace.repo);
    match subcommand {
        PolicySubcommand::Init {
            policy_name,
            signing_key,
            signers,
            threshold,
        } => {
            let key = workspace.signing_key(signing_key.as_deref())?;
            let signers = signers
                .iter()
                .map(|p| read_public_key(p))
                .collect::<Result<Vec<_>>>()?;
            store.init_file(policy_name, signers, *threshold, &key)?;
            println!("Initialized policy '{policy_name}'");
        }
        PolicySubcommand::Sign {
            policy_name,
            signing_key,
        } => {
            let key = workspace.signing_key(signing_key.as_deref())?;
            if store.sign(policy_name, &key)? {
                println!("Signed policy '{policy_name}' with {}", key.key_id().short());
            } else {
                println!(
                    "Key {} is not a signer of policy '{policy_name}', nothing signed",
                    key.key_id().short()
                );
            }
        }
        PolicySubcommand::AddRule {
            policy_name,
            signing_key,
            rule_name,
            patterns,
            authorize,
            delegate,
            threshold,
        } => {
            let key = workspace.signing_key(signing_key.as_deref())?;
            let patterns = patterns
                .iter()
                .map(|p| p.parse::<Pattern>())
                .collect::<Result<Vec<_>, _>>()?;
            let keys = authorize
                .iter()
                .map(|p| read_public_key(p))
                .collect::<Result<Vec<_>>>()?;
            let ids = keys.iter().map(|k| k.key_id());
            let rule = match delegate {
                Some(target) => Rule::delegate(rule_name, patterns, target, ids, *threshold),
                None => {
                    if keys.is_empty() {
                        bail!("a rule needs at least one --authorize key or a --delegate target");
                    }
                    Rule::keys(rule_name, patterns, ids)
                }
            };
            store.add_rule(policy_name, rule, keys, &key)?;
            println!("Added rule '{rule_name}' to policy '{policy_name}'");
        }
        PolicySubcommand::RemoveRule {
            policy_name,
            signing_key,
            rule_name,
        } => {
            let key = workspace.signing_key(signing_key.as_deref())?;
            store.remove_rule(policy_name, rule_name, &key)?;
            println!("Removed rule '{rule_name}' from policy '{policy_name}'");
        }
        PolicySubcommand::ListRules { policy_name } => {
            for rule in store.list_rules(policy_name)? {
                let patterns: Vec<String> = rule.patterns.iter().map(ToString::to_string).collect();
                println!(
                    "{}: {} -> {}",
                    rule.name,
                    patterns.join(", "),
                    describe_authority(&rule.authority)
                );
            }
        }
        PolicySubcommand::Apply { signing_key } => {
            let signer = workspace.optional_signing_key(signing_key.as_deref())?;
            let applied = apply_policy(&workspace.repo, signer.as_ref())?;
            println!("Applied policy state {}", applied.state.short());
        }
        PolicySubcommand::Discard => {
            if store.discard()? {
                println!("Discarded staged policy changes");
            } else {
                println!("No staged policy changes");
            }
        }
        PolicySubcommand::Resolve { target } => {
            let target = parse_target(target);
            let resolution = store.resolve(&target)?;
            for step in resolution.steps() {
                println!(
                    "{}/{}: {}",
                    step.policy,
                    step.rule.name,
                    describe_authority(&step.rule.authority)
                );
            }
            println!(
                "{target} is governed by rule '{}' in policy '{}'",
                resolution.governing().rule.name,
                resolution.governing().policy
            );
        }
    }
    Ok(())
}
