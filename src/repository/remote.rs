// src/repository/remote.rs

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::package::{self, Package};

use super::Repository;

/// Read-only repository of available packages
///
/// The directory is kept in sync out of band (the sync mechanism is not the
/// core's concern); everything here is plain reads.
#[derive(Debug)]
pub struct RemoteRepo {
    root: PathBuf,
}

impl RemoteRepo {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(RemoteRepo { root })
    }
}

impl Repository for RemoteRepo {
    fn root(&self) -> &Path {
        &self.root
    }

    fn load_package(&self, dir: &Path) -> Result<Package> {
        package::load_package(dir)
    }
}
