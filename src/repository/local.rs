// src/repository/local.rs

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::error::{Error, Result};
use crate::package::{self, InstallMeta, InstallReason, MANIFEST_FILE, META_FILE, Package};

use super::Repository;

/// The installed-package database: one directory per installed package,
/// holding a copy of its manifest plus `meta.json`.
///
/// `add_package` and `remove_package` are direct filesystem mutations with
/// no rollback of their own; all-or-nothing behavior belongs to the
/// transaction that calls them.
#[derive(Debug)]
pub struct LocalRepo {
    root: PathBuf,
}

impl LocalRepo {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(LocalRepo { root })
    }

    /// Record `package` as installed for `reason`
    pub fn add_package(&self, reason: InstallReason, package: &Package) -> Result<()> {
        let dir = self.root.join(&package.name);
        if dir.exists() {
            return Err(Error::AlreadyExists(package.name.clone()));
        }
        fs::create_dir_all(&dir)?;
        fs::copy(package.path.join(MANIFEST_FILE), dir.join(MANIFEST_FILE))?;

        let meta = InstallMeta {
            install_date: Utc::now(),
            reason,
        };
        fs::write(dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)?;
        info!("recorded {} as installed ({:?})", package, reason);
        Ok(())
    }

    /// Drop the installed record of `package`
    pub fn remove_package(&self, package: &Package) -> Result<()> {
        let dir = self.root.join(&package.name);
        if !dir.exists() {
            return Err(Error::NotFound(package.name.clone()));
        }
        fs::remove_dir_all(dir)?;
        info!("removed install record of {}", package.name);
        Ok(())
    }
}

impl Repository for LocalRepo {
    fn root(&self) -> &Path {
        &self.root
    }

    fn load_package(&self, dir: &Path) -> Result<Package> {
        package::load_local_package(dir)
    }
}
