// src/config.rs

//! Configuration
//!
//! A single JSON file names the five directories everything else works in.
//! Absent file means defaults relative to the modkeep home, which is
//! `$MODKEEP_HOME` when set and `$HOME/.modkeep` otherwise.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Synced remote repository (read-only package manifests)
    pub repo_dir: PathBuf,
    /// Installed-package records
    pub local_dir: PathBuf,
    /// Downloaded archives, keyed by URI
    pub cache_dir: PathBuf,
    /// Extracted archives, keyed by URI
    pub source_dir: PathBuf,
    /// Where packages install their files
    pub install_dir: PathBuf,
}

impl Config {
    /// Default layout rooted at `home`
    pub fn default_at(home: &Path) -> Self {
        Config {
            repo_dir: home.join("repo"),
            local_dir: home.join("local"),
            cache_dir: home.join("cache"),
            source_dir: home.join("sources"),
            install_dir: home.join("install"),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load the config the CLI should use: the explicit path when given,
    /// else `config.json` in the modkeep home, else the defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let home = home_dir();
        let path = home.join(CONFIG_FILE);
        if path.exists() {
            debug!("loading config from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default_at(&home))
        }
    }

    /// Create every configured directory that does not exist yet
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            &self.repo_dir,
            &self.local_dir,
            &self.cache_dir,
            &self.source_dir,
            &self.install_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn home_dir() -> PathBuf {
    if let Ok(home) = std::env::var("MODKEEP_HOME") {
        return PathBuf::from(home);
    }
    match std::env::var("HOME") {
        Ok(home) => Path::new(&home).join(".modkeep"),
        Err(_) => PathBuf::from(".modkeep"),
    }
}
