//! `refguard`: signed policy and reference state verification

use clap::{Parser, Subcommand};
use refguard_core::RefguardError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands {
    pub mod policy;
    pub mod repo;
    pub mod rsl;
    pub mod trust;
    pub mod verify;
}
mod config;
mod workspace;

use workspace::Workspace;

#[derive(Parser)]
#[command(name = "refguard")]
#[command(about = "Refguard - signed policies and a tamper-evident log for repository references", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository directory
    #[arg(short = 'C', long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a signing key pair
    Keygen {
        /// Private key path; the public key goes to <path>.pub
        path: PathBuf,
        /// Overwrite existing key files
        #[arg(long)]
        force: bool,
    },

    /// Create a repository
    Init {
        /// Default signing key for this repository
        #[arg(short = 'k', long)]
        signing_key: Option<PathBuf>,
    },

    /// Root of trust management
    Trust {
        #[command(subcommand)]
        command: commands::trust::TrustSubcommand,
    },

    /// Policy management
    Policy {
        #[command(subcommand)]
        command: commands::policy::PolicySubcommand,
    },

    /// Create a signed commit on a reference
    Commit {
        /// Reference to advance
        reference: String,
        /// Commit message
        #[arg(short, long)]
        message: String,
        /// PATH=SOURCE: set PATH to the contents of local file SOURCE (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
        /// Remove PATH (repeatable)
        #[arg(long = "remove")]
        removals: Vec<String>,
        /// Signing key
        #[arg(short = 'k', long)]
        signing_key: Option<PathBuf>,
    },

    /// Verify a reference against its recorded history
    VerifyRef {
        /// Reference to verify
        reference: String,
    },

    /// Reference state log
    Rsl {
        #[command(subcommand)]
        command: commands::rsl::RslSubcommand,
    },

    /// Copy a repository and record it as origin
    Clone {
        /// Directory of the repository to copy
        url: PathBuf,
        /// Destination directory
        #[arg(value_name = "DIR")]
        destination: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Trust and policy failures exit with 1, storage and transport failures with 128
fn exit_status(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<RefguardError>() {
        Some(e) if e.is_transport_failure() => 128,
        _ => 1,
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Keygen { path, force } => commands::repo::keygen(&path, force)?,
        Commands::Init { signing_key } => commands::repo::init(&cli.dir, signing_key)?,
        Commands::Clone { url, destination } => commands::repo::clone(&url, &destination)?,
        Commands::Trust { command } => {
            commands::trust::handle_trust_command(&Workspace::open(&cli.dir)?, &command)?;
        }
        Commands::Policy { command } => {
            commands::policy::handle_policy_command(&Workspace::open(&cli.dir)?, &command)?;
        }
        Commands::Commit {
            reference,
            message,
            files,
            removals,
            signing_key,
        } => commands::repo::commit(
            &Workspace::open(&cli.dir)?,
            &reference,
            &message,
            &files,
            &removals,
            signing_key.as_deref(),
        )?,
        Commands::VerifyRef { reference } => {
            return commands::verify::verify_ref(&Workspace::open(&cli.dir)?, &reference);
        }
        Commands::Rsl { command } => {
            commands::rsl::handle_rsl_command(&Workspace::open(&cli.dir)?, &command)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::from(exit_status(&error))
        }
    }
}
