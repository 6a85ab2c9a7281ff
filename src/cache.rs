// src/cache.rs

//! Content-addressable directory cache
//!
//! `DirMap` maps an opaque key (typically a source URI) to a directory whose
//! name is the hex SHA-256 of the key. Additions are transactional: the
//! caller populates a single staging directory and a commit is one atomic
//! directory rename, so a key either fully exists or does not. A crash
//! mid-population leaves only the staging directory behind, which the next
//! allocation wipes.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{Error, Result};

/// Name of the single in-flight staging directory. No hex digest collides
/// with it, so it can live inside the container.
const STAGING_DIR: &str = "TEMP";

/// A key -> directory store with atomic, rename-based commit
#[derive(Debug)]
pub struct DirMap {
    root: PathBuf,
    staging: PathBuf,
    /// Destination of the open transaction; `Some` means one is in flight
    pending: Option<PathBuf>,
}

impl DirMap {
    /// Open the cache at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let staging = root.join(STAGING_DIR);
        Ok(DirMap {
            root,
            staging,
            pending: None,
        })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.root.join(format!("{:x}", digest))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.key_path(key).exists()
    }

    /// Begin a transaction for `key` and return the staging directory for
    /// the caller to populate.
    ///
    /// Only one transaction may be open per instance; concurrent allocations
    /// must be serialized by the caller.
    pub fn alloc(&mut self, key: &str) -> Result<PathBuf> {
        assert!(self.pending.is_none(), "cache transaction already open");
        if self.contains(key) {
            return Err(Error::AlreadyExists(key.to_string()));
        }

        self.pending = Some(self.key_path(key));
        if self.staging.exists() {
            fs::remove_dir_all(&self.staging)?;
        }
        fs::create_dir(&self.staging)?;
        Ok(self.staging.clone())
    }

    /// Atomically publish the staging directory under the allocated key
    pub fn commit(&mut self) -> Result<()> {
        let dest = self
            .pending
            .take()
            .expect("commit without an open cache transaction");
        // Directory rename is atomic at the filesystem level.
        fs::rename(&self.staging, &dest)?;
        debug!("cache commit -> {}", dest.display());
        Ok(())
    }

    /// Discard the staging directory and close the transaction
    pub fn abort(&mut self) -> Result<()> {
        self.pending = None;
        if self.staging.exists() {
            fs::remove_dir_all(&self.staging)?;
        }
        Ok(())
    }

    /// Scoped acquisition: populate the staging area in `f`. On error the
    /// transaction is aborted before the error propagates; on success it is
    /// committed. Returns the key's final path.
    pub fn atomic_add<F>(&mut self, key: &str, f: F) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let staging = self.alloc(key)?;
        match f(&staging) {
            Ok(()) => {
                self.commit()?;
                self.get(key)
            }
            Err(e) => {
                // Best effort; the population error is the one to surface.
                let _ = self.abort();
                Err(e)
            }
        }
    }

    /// Path of an existing key
    pub fn get(&self, key: &str) -> Result<PathBuf> {
        let path = self.key_path(key);
        if !path.exists() {
            return Err(Error::NotFound(key.to_string()));
        }
        Ok(path)
    }

    /// Remove an existing key
    pub fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.key_path(key);
        if !path.exists() {
            return Err(Error::NotFound(key.to_string()));
        }
        fs::remove_dir_all(path)?;
        Ok(())
    }

    /// Drop every entry. Not legal while a transaction is open.
    pub fn clear(&mut self) -> Result<()> {
        assert!(self.pending.is_none(), "clear during open cache transaction");
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }

    /// Total size in bytes of everything cached
    pub fn disk_usage(&self) -> Result<u64> {
        fn dir_size(dir: &Path) -> Result<u64> {
            let mut total = 0;
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let meta = entry.metadata()?;
                total += if meta.is_dir() {
                    dir_size(&entry.path())?
                } else {
                    meta.len()
                };
            }
            Ok(total)
        }
        dir_size(&self.root)
    }
}
