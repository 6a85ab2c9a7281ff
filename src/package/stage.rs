// src/package/stage.rs

//! Packaging step
//!
//! During prepare the transaction asks each install target for its copy
//! operations. Sources have been extracted into cache directories with
//! hashed names, so the paths a manifest declares are translated through a
//! `SourceTree`: the first component of a relative path names a source (its
//! filename stem) and is remapped to that source's cache directory.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

use super::Package;

/// A staged copy: an absolute path into the source cache, and the relative
/// path it installs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOp {
    pub source: PathBuf,
    pub dest: PathBuf,
}

/// Path-translation view over the staged sources
#[derive(Debug, Default)]
pub struct SourceTree {
    roots: HashMap<String, PathBuf>,
}

impl SourceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a source name at its extracted cache directory
    pub fn remap(&mut self, name: &str, dir: PathBuf) {
        self.roots.insert(name.to_string(), dir);
    }

    /// Translate a relative path whose first component is a source name
    pub fn translate(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            return Err(Error::PathTranslation(format!(
                "absolute path {} has no translation",
                path.display()
            )));
        }

        let mut components = path.components();
        let root = match components.next() {
            Some(Component::Normal(root)) => root.to_string_lossy().into_owned(),
            _ => {
                return Err(Error::PathTranslation(format!(
                    "path {} does not start with a source name",
                    path.display()
                )));
            }
        };

        let mapped = self.roots.get(&root).ok_or_else(|| {
            Error::PathTranslation(format!("unknown source {:?} in {}", root, path.display()))
        })?;
        Ok(mapped.join(components.as_path()))
    }
}

/// The packaging step of a manifest provider
///
/// Given a package and the path-translation view over its staged sources,
/// produce the copy operations that install it.
pub trait ManifestRuntime {
    fn package(&self, package: &Package, sources: &SourceTree) -> Result<Vec<CopyOp>>;
}

/// Packaging step backed by the manifest's declared file table
#[derive(Debug, Default)]
pub struct DeclaredFiles;

impl ManifestRuntime for DeclaredFiles {
    fn package(&self, package: &Package, sources: &SourceTree) -> Result<Vec<CopyOp>> {
        let mut ops = Vec::with_capacity(package.files.len());
        for mapping in &package.files {
            let dest = PathBuf::from(&mapping.to);
            if dest.is_absolute() {
                return Err(Error::PathTranslation(format!(
                    "install path {} must be relative",
                    dest.display()
                )));
            }
            ops.push(CopyOp {
                source: sources.translate(Path::new(&mapping.from))?,
                dest,
            });
        }
        Ok(ops)
    }
}
