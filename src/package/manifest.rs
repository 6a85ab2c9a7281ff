// src/package/manifest.rs

//! Manifest and install-metadata loading
//!
//! Each package lives in its own directory: a `manifest.json` describing the
//! package, and for installed packages a `meta.json` recording install date
//! and reason.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::version::Version;

use super::{FileMapping, InstallReason, LocalState, Package, SourceLine};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const META_FILE: &str = "meta.json";

/// On-disk package description
#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    depends: Vec<String>,
    /// `query::note` pairs
    #[serde(default)]
    optdepends: Vec<String>,
    #[serde(default)]
    provides: Vec<String>,
    #[serde(default)]
    conflicts: Vec<String>,
    /// `query::query` pairs
    #[serde(default)]
    bridges: Vec<String>,
    /// `uri::filename` pairs
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    files: Vec<FileMapping>,
}

fn default_version() -> String {
    "1".to_string()
}

/// Installed-package record stored next to the manifest in the local repo
#[derive(Debug, Serialize, Deserialize)]
pub struct InstallMeta {
    pub install_date: DateTime<Utc>,
    pub reason: InstallReason,
}

fn manifest_error(dir: &Path, reason: impl Into<String>) -> Error {
    Error::Manifest {
        path: dir.to_path_buf(),
        reason: reason.into(),
    }
}

fn split_pair(dir: &Path, raw: &str, what: &str) -> Result<(String, String)> {
    match raw.split_once("::") {
        Some((a, b)) if !a.is_empty() && !b.is_empty() => Ok((a.to_string(), b.to_string())),
        _ => Err(manifest_error(dir, format!("bad {} entry: {:?}", what, raw))),
    }
}

/// Load a package from its directory
pub fn load_package(dir: &Path) -> Result<Package> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&manifest_path)
        .map_err(|e| manifest_error(dir, format!("cannot read {}: {}", MANIFEST_FILE, e)))?;
    let manifest: Manifest =
        serde_json::from_str(&raw).map_err(|e| manifest_error(dir, e.to_string()))?;

    let version = manifest
        .version
        .parse::<Version>()
        .map_err(|_| manifest_error(dir, format!("bad version {:?}", manifest.version)))?;

    let optdepends = manifest
        .optdepends
        .iter()
        .map(|raw| split_pair(dir, raw, "optdepends"))
        .collect::<Result<Vec<_>>>()?;
    let bridges = manifest
        .bridges
        .iter()
        .map(|raw| split_pair(dir, raw, "bridge"))
        .collect::<Result<Vec<_>>>()?;
    let sources = manifest
        .sources
        .iter()
        .map(|raw| {
            raw.parse::<SourceLine>()
                .map_err(|_| manifest_error(dir, format!("bad source entry: {:?}", raw)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Package {
        name: manifest.name,
        version,
        description: manifest.description,
        priority: manifest.priority,
        dependencies: manifest.depends,
        optdepends,
        provides: manifest.provides,
        conflicts: manifest.conflicts,
        bridges,
        sources,
        files: manifest.files,
        path: dir.to_path_buf(),
        local: None,
    })
}

/// Load an installed package: the manifest plus its `meta.json`
pub fn load_local_package(dir: &Path) -> Result<Package> {
    let mut package = load_package(dir)?;

    let meta_path = dir.join(META_FILE);
    let raw = fs::read_to_string(&meta_path)
        .map_err(|e| manifest_error(dir, format!("cannot read {}: {}", META_FILE, e)))?;
    let meta: InstallMeta =
        serde_json::from_str(&raw).map_err(|e| manifest_error(dir, e.to_string()))?;

    package.local = Some(LocalState {
        install_date: meta.install_date,
        reason: meta.reason,
    });
    Ok(package)
}
