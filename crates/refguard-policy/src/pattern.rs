//! Namespaced glob patterns
//!
//! A pattern is written `namespace:glob`. The `git` namespace matches fully
//! qualified reference names, the `file` namespace matches repository-relative
//! paths. A pattern without a namespace is a `git` pattern.

use refguard_core::{RefguardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a pattern ranges over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// Reference names (`refs/heads/main`)
    Git,
    /// Paths inside the tree (`src/lib.rs`)
    File,
}

impl Namespace {
    /// Prefix used in the textual form
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Git => "git",
            Namespace::File => "file",
        }
    }
}

/// Something a change touches and a rule may govern
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    /// A fully qualified reference name
    Ref(String),
    /// A repository-relative path
    Path(String),
}

impl Target {
    /// Target for a reference, expanding short branch names
    pub fn reference(name: &str) -> Self {
        Target::Ref(refguard_core::absolute_ref_name(name))
    }

    /// Target for a path
    pub fn path(path: &str) -> Self {
        Target::Path(path.trim_start_matches('/').to_string())
    }

    /// Namespace this target lives in
    pub fn namespace(&self) -> Namespace {
        match self {
            Target::Ref(_) => Namespace::Git,
            Target::Path(_) => Namespace::File,
        }
    }

    /// The bare name or path
    pub fn name(&self) -> &str {
        match self {
            Target::Ref(name) | Target::Path(name) => name,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace().as_str(), self.name())
    }
}

/// A compiled `namespace:glob` pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    namespace: Namespace,
    glob: glob::Pattern,
}

impl Pattern {
    /// Namespace of the pattern
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Whether the pattern covers `target`
    pub fn matches(&self, target: &Target) -> bool {
        self.namespace == target.namespace() && self.glob.matches(target.name())
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.glob.as_str() == other.glob.as_str()
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace.as_str(), self.glob.as_str())
    }
}

impl FromStr for Pattern {
    type Err = RefguardError;

    fn from_str(s: &str) -> Result<Self> {
        let (namespace, glob) = match s.split_once(':') {
            Some(("git", rest)) => (Namespace::Git, rest),
            Some(("file", rest)) => (Namespace::File, rest),
            Some((other, _)) => {
                return Err(RefguardError::invalid(format!(
                    "unknown pattern namespace '{other}'"
                )))
            }
            None => (Namespace::Git, s),
        };
        if glob.is_empty() {
            return Err(RefguardError::invalid(format!("empty pattern '{s}'")));
        }
        let glob = glob::Pattern::new(glob)
            .map_err(|e| RefguardError::invalid(format!("bad pattern '{s}': {e}")))?;
        Ok(Self { namespace, glob })
    }
}

impl TryFrom<String> for Pattern {
    type Error = RefguardError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.to_string()
    }
}
