//! Per-repository configuration (`.refguard/config.toml`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Settings stored next to the repository data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Private key used when a command is not given `--signing-key`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<PathBuf>,

    /// Named remotes, each the directory of another repository
    #[serde(default)]
    pub remotes: BTreeMap<String, PathBuf>,
}

impl Config {
    /// Load `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Write to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).context("encoding config")?;
        std::fs::write(path, text).with_context(|| format!("writing config {}", path.display()))
    }
}
