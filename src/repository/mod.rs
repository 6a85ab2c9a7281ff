// src/repository/mod.rs

//! Package repositories
//!
//! A repository is a directory of package directories. The remote repository
//! (synced from elsewhere) is read-only; the local repository holds the
//! installed set and is mutated by transactions. Both answer the same search
//! questions: literal lookup, provider search, fuzzy text search, dependant
//! search and bridge search.

mod local;
mod remote;

pub use local::LocalRepo;
pub use remote::RemoteRepo;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::package::Package;
use crate::query::Query;

/// Maximum number of results returned by `search`
const SEARCH_LIMIT: usize = 10;

/// Read-side interface shared by the remote and local repositories
///
/// The provided methods implement every search in terms of two primitives:
/// a full scan and an exact directory lookup.
pub trait Repository {
    /// Root directory holding one subdirectory per package
    fn root(&self) -> &Path;

    /// Load the package stored in `dir`
    fn load_package(&self, dir: &Path) -> Result<Package>;

    /// Every package in the repository
    fn packages(&self) -> Result<Vec<Package>> {
        let mut packages = Vec::new();
        for dir in package_dirs(self.root())? {
            packages.push(self.load_package(&dir)?);
        }
        packages.sort();
        Ok(packages)
    }

    /// Exact lookup: the directory named by the query, iff the query matches
    fn find_literal(&self, query: &Query) -> Result<Option<Package>> {
        let dir = self.root().join(query.name());
        if !dir.exists() {
            return Ok(None);
        }
        let package = self.load_package(&dir)?;
        if query.matches(&package) {
            Ok(Some(package))
        } else {
            Ok(None)
        }
    }

    /// All packages satisfying the query: the literal match if there is one,
    /// otherwise every provider, minus `exclude`.
    fn find_packages(&self, query: &Query, exclude: &BTreeSet<Package>) -> Result<BTreeSet<Package>> {
        if !exclude.iter().any(|e| e.name == query.name()) {
            if let Some(package) = self.find_literal(query)? {
                let mut found = BTreeSet::new();
                found.insert(package);
                return Ok(found);
            }
        }
        // No literal package; look for providers.
        let mut providers = BTreeSet::new();
        for candidate in self.packages()? {
            if exclude.contains(&candidate) {
                continue;
            }
            if query.matches(&candidate) {
                debug!("{} provides {}", candidate, query);
                providers.insert(candidate);
            }
        }
        Ok(providers)
    }

    /// Deterministic single pick: the literal match, else the first provider
    /// in name order. Real ambiguity is resolved by the expander's chooser.
    fn find_package(&self, query: &Query, exclude: &BTreeSet<Package>) -> Result<Option<Package>> {
        let mut matches = self.find_packages(query, exclude)?;
        Ok(matches.pop_first())
    }

    /// Ranked fuzzy text search over names and descriptions
    fn search(&self, terms: &str) -> Result<Vec<Package>> {
        let needle = terms.to_lowercase();
        let mut scored = Vec::new();
        for package in self.packages()? {
            let score = search_score(&package, &needle);
            if score > 0 {
                scored.push((score, package));
            }
        }
        scored.sort_by(|(sa, pa), (sb, pb)| sb.cmp(sa).then_with(|| pa.cmp(pb)));
        Ok(scored.into_iter().take(SEARCH_LIMIT).map(|(_, p)| p).collect())
    }

    /// Packages with at least one dependency query matching `package`
    fn find_dependants(&self, package: &Package) -> Result<Vec<Package>> {
        let mut dependants = Vec::new();
        for candidate in self.packages()? {
            if depends_on(&candidate, package)? {
                dependants.push(candidate);
            }
        }
        Ok(dependants)
    }

    /// Packages whose bridge pairs connect `p1` and `p2`, in either
    /// orientation, minus `exclude`
    fn find_bridges(
        &self,
        p1: &Package,
        p2: &Package,
        exclude: &BTreeSet<Package>,
    ) -> Result<BTreeSet<Package>> {
        let mut bridges = BTreeSet::new();
        for candidate in self.packages()? {
            if exclude.contains(&candidate) {
                continue;
            }
            for (a, b) in &candidate.bridges {
                let qa: Query = a.parse()?;
                let qb: Query = b.parse()?;
                if (qa.matches(p1) && qb.matches(p2)) || (qb.matches(p1) && qa.matches(p2)) {
                    bridges.insert(candidate);
                    break;
                }
            }
        }
        Ok(bridges)
    }
}

fn depends_on(candidate: &Package, package: &Package) -> Result<bool> {
    for dep in &candidate.dependencies {
        let query: Query = dep.parse()?;
        if query.matches(package) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn search_score(package: &Package, needle: &str) -> u32 {
    let name = package.name.to_lowercase();
    let mut score = if name == needle {
        100
    } else if name.starts_with(needle) {
        80
    } else if name.contains(needle) {
        60
    } else {
        0
    };
    if package.description.to_lowercase().contains(needle) {
        score += 20;
    }
    score
}

/// Package directories under `root`, skipping hidden entries
pub(crate) fn package_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        dirs.push(entry.path());
    }
    dirs.sort();
    Ok(dirs)
}
