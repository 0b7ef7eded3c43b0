//! Locating the repository, its configuration and key files

use anyhow::{bail, Context, Result};
use refguard_core::{FsRepository, KeyId, PublicKey, SigningKey};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Directory holding repository data inside a working directory
pub const STATE_DIR: &str = ".refguard";
/// Configuration file inside [`STATE_DIR`]
pub const CONFIG_FILE: &str = "config.toml";

/// An opened repository together with its configuration
pub struct Workspace {
    state_dir: PathBuf,
    pub repo: FsRepository,
    pub config: Config,
}

impl Workspace {
    /// Create the repository under `dir`
    pub fn init(dir: &Path, config: Config) -> Result<Self> {
        let state_dir = dir.join(STATE_DIR);
        if state_dir.join(CONFIG_FILE).exists() {
            bail!("{} is already a refguard repository", dir.display());
        }
        let repo = FsRepository::init(&state_dir)
            .with_context(|| format!("creating repository in {}", dir.display()))?;
        let workspace = Self {
            state_dir,
            repo,
            config,
        };
        workspace.save_config()?;
        Ok(workspace)
    }

    /// Open the repository under `dir`
    pub fn open(dir: &Path) -> Result<Self> {
        let state_dir = dir.join(STATE_DIR);
        let repo = FsRepository::open(&state_dir)
            .with_context(|| format!("opening repository in {}", dir.display()))?;
        let config = Config::load(&state_dir.join(CONFIG_FILE))?;
        Ok(Self {
            state_dir,
            repo,
            config,
        })
    }

    /// Persist the configuration
    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.state_dir.join(CONFIG_FILE))
    }

    /// `explicit`, else the configured default signing key
    pub fn signing_key(&self, explicit: Option<&Path>) -> Result<SigningKey> {
        match self.optional_signing_key(explicit)? {
            Some(key) => Ok(key),
            None => bail!("no signing key given and none configured"),
        }
    }

    /// Like [`Workspace::signing_key`], but absent when neither is set
    pub fn optional_signing_key(&self, explicit: Option<&Path>) -> Result<Option<SigningKey>> {
        explicit
            .or(self.config.signing_key.as_deref())
            .map(read_signing_key)
            .transpose()
    }

    /// Repository behind `remote`, a configured name or a directory
    pub fn open_remote(&self, remote: &str) -> Result<FsRepository> {
        let dir = self
            .config
            .remotes
            .get(remote)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(remote));
        FsRepository::open(dir.join(STATE_DIR))
            .with_context(|| format!("opening remote '{remote}' at {}", dir.display()))
    }
}

/// Read a private key file (hex seed)
pub fn read_signing_key(path: &Path) -> Result<SigningKey> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading signing key {}", path.display()))?;
    SigningKey::from_hex(&text).with_context(|| format!("parsing signing key {}", path.display()))
}

/// Read a public key
///
/// Accepts a `.pub` file or a private key file, whose public half is derived.
pub fn read_public_key(path: &Path) -> Result<PublicKey> {
    let is_public = path.extension().is_some_and(|ext| ext == "pub");
    if is_public {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading public key {}", path.display()))?;
        return text
            .parse()
            .with_context(|| format!("parsing public key {}", path.display()));
    }
    Ok(read_signing_key(path)?.public_key())
}

/// Key id named by `key`: a key file, or a fingerprint as printed by `keygen`
pub fn key_id(key: &str) -> Result<KeyId> {
    let path = Path::new(key);
    if path.exists() {
        Ok(read_public_key(path)?.key_id())
    } else {
        Ok(KeyId::new(key))
    }
}

/// Write `path` (hex seed) and `path.pub`
pub fn write_key_pair(path: &Path, key: &SigningKey, overwrite: bool) -> Result<PathBuf> {
    let mut public_path = path.as_os_str().to_owned();
    public_path.push(".pub");
    let public_path = PathBuf::from(public_path);
    if !overwrite && (path.exists() || public_path.exists()) {
        bail!("{} already exists", path.display());
    }
    fs::write(path, key.to_hex()).with_context(|| format!("writing {}", path.display()))?;
    fs::write(&public_path, key.public_key().to_string())
        .with_context(|| format!("writing {}", public_path.display()))?;
    Ok(public_path)
}
