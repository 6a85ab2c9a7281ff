// src/lib.rs

//! modkeep - a package manager for game modding setups
//!
//! Mods are described by JSON manifests in a synced remote repository,
//! installed into per-package directories, and tracked in a local repository
//! with the reason they are present.
//!
//! # Architecture
//!
//! - Directory-backed state: repositories and caches are plain directories,
//!   inspectable with ordinary tools
//! - Three-phase transactions: expand resolves the plan, prepare downloads
//!   and stages everything fallible, commit only replays staged work
//! - Ecosystem quirks modeled directly: provides aliases, bridge packages
//!   reconciling declared conflicts, and install-reason tracking for
//!   orphan removal

pub mod cache;
pub mod config;
mod error;
pub mod extract;
pub mod fetch;
pub mod package;
pub mod query;
pub mod repository;
pub mod resolve;
pub mod transaction;
pub mod version;

pub use error::{Error, Result};
