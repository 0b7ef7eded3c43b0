// Repository lifecycle commands: keys, init, clone and commit

use anyhow::{bail, Context, Result};
use refguard_core::{absolute_ref_name, commit_files, transport, SigningKey};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::workspace::{write_key_pair, Workspace};

/// Generate a key pair at `path` and `path.pub`
pub fn keygen(path: &Path, force: bool) -> Result<()> {
    let key = SigningKey::generate();
    let public_path = write_key_pair(path, &key, force)?;
    println!("Wrote {} and {}", path.display(), public_path.display());
    println!("Key id: {}", key.key_id());
    Ok(())
}

/// Create a repository in `dir`
pub fn init(dir: &Path, signing_key: Option<PathBuf>) -> Result<()> {
    let signing_key = signing_key
        .map(|path| {
            path.canonicalize()
                .with_context(|| format!("locating signing key {}", path.display()))
        })
        .transpose()?;
    Workspace::init(
        dir,
        Config {
            signing_key,
            ..Config::default()
        },
    )?;
    println!("Initialized refguard repository in {}", dir.display());
    Ok(())
}

/// Copy the repository at `url` into `dir`, recording it as `origin`
pub fn clone(url: &Path, dir: &Path) -> Result<()> {
    let source = Workspace::open(url)?;
    let url = url
        .canonicalize()
        .with_context(|| format!("locating {}", url.display()))?;
    let mut config = Config::default();
    config.remotes.insert("origin".to_string(), url.clone());
    let target = Workspace::init(dir, config)?;
    transport::clone_repository(&source.repo, &target.repo)?;
    info!(from = %url.display(), to = %dir.display(), "clone complete");
    println!("Cloned {} into {}", url.display(), dir.display());
    Ok(())
}

/// Parse `path=source` pairs into file contents read from `source`
fn read_changes(
    files: &[String],
    removals: &[String],
) -> Result<BTreeMap<String, Option<Vec<u8>>>> {
    let mut changes = BTreeMap::new();
    for change in files {
        let Some((path, source)) = change.split_once('=') else {
            bail!("expected PATH=SOURCE, got '{change}'");
        };
        let content =
            std::fs::read(source).with_context(|| format!("reading {source} for {path}"))?;
        changes.insert(path.trim_start_matches('/').to_string(), Some(content));
    }
    for path in removals {
        changes.insert(path.trim_start_matches('/').to_string(), None);
    }
    if changes.is_empty() {
        bail!("nothing to commit: pass --file or --remove");
    }
    Ok(changes)
}

/// Create a signed commit on `reference`
pub fn commit(
    workspace: &Workspace,
    reference: &str,
    message: &str,
    files: &[String],
    removals: &[String],
    signing_key: Option<&Path>,
) -> Result<()> {
    let key = workspace.signing_key(signing_key)?;
    let changes = read_changes(files, removals)?;
    let reference = absolute_ref_name(reference);
    let id = commit_files(&workspace.repo, &reference, &changes, message, &key)?;
    println!("[{reference} {}] {message}", id.short());
    Ok(())
}
