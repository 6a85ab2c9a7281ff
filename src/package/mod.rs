// src/package/mod.rs

//! Package model
//!
//! A package is an installable unit described by a manifest: identity
//! (name + version), dependency/provides/conflicts queries, bridge pairs,
//! download sources and a declared packaging table. Installed packages
//! additionally carry local metadata (install date and reason).

mod manifest;
mod stage;

pub use manifest::{InstallMeta, MANIFEST_FILE, META_FILE, load_local_package, load_package};
pub use stage::{CopyOp, DeclaredFiles, ManifestRuntime, SourceTree};

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::version::Version;

/// Why a package is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallReason {
    /// Explicitly requested by the user
    Required,
    /// Pulled in to satisfy a dependency
    Dependency,
}

/// Metadata that only installed packages have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalState {
    pub install_date: DateTime<Utc>,
    pub reason: InstallReason,
}

/// A download source, written `uri::filename` in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub uri: String,
    pub filename: String,
}

impl SourceLine {
    /// The filename with its final extension stripped; this is the root
    /// under which the packaging table addresses the extracted source.
    pub fn name_stem(&self) -> &str {
        match self.filename.rsplit_once('.') {
            Some((stem, _ext)) => stem,
            None => &self.filename,
        }
    }
}

impl FromStr for SourceLine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once("::") {
            Some((uri, filename)) if !uri.is_empty() && !filename.is_empty() => Ok(SourceLine {
                uri: uri.to_string(),
                filename: filename.to_string(),
            }),
            _ => Err(Error::MalformedQuery(format!("bad source line: {:?}", s))),
        }
    }
}

/// One entry of the declared packaging table: a relative path inside the
/// staged sources mapped to a relative install path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMapping {
    pub from: String,
    pub to: String,
}

/// An installable unit
///
/// Identity, equality and hashing go by `name` alone: two packages with the
/// same name are the same package regardless of version. Callers must keep
/// that invariant in mind when building sets: a set never distinguishes two
/// versions of one name.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub version: Version,
    pub description: String,
    pub priority: i64,
    /// Dependency queries, in manifest order
    pub dependencies: Vec<String>,
    /// Optional dependency queries with a reason note
    pub optdepends: Vec<(String, String)>,
    /// Alternate names (`name` or `name=version`) this package satisfies
    pub provides: Vec<String>,
    /// Queries for packages this one cannot coexist with
    pub conflicts: Vec<String>,
    /// Unordered pairs of queries this package allows to coexist
    pub bridges: Vec<(String, String)>,
    pub sources: Vec<SourceLine>,
    /// Declared packaging table, resolved at prepare time
    pub files: Vec<FileMapping>,
    /// Directory the manifest was loaded from
    pub path: PathBuf,
    /// Present iff the package is installed
    pub local: Option<LocalState>,
}

impl Package {
    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }

    pub fn reason(&self) -> Option<InstallReason> {
        self.local.as_ref().map(|l| l.reason)
    }

    /// Directory this package installs into under the given root
    pub fn install_dir(&self, install_root: &Path) -> PathBuf {
        install_root.join(&self.name)
    }

    #[cfg(test)]
    pub fn for_tests(name: &str, version: &str) -> Package {
        Package {
            name: name.to_string(),
            version: version.parse().unwrap(),
            description: String::new(),
            priority: 0,
            dependencies: Vec::new(),
            optdepends: Vec::new(),
            provides: Vec::new(),
            conflicts: Vec::new(),
            bridges: Vec::new(),
            sources: Vec::new(),
            files: Vec::new(),
            path: PathBuf::new(),
            local: None,
        }
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Ord for Package {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.version)
    }
}
