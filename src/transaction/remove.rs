// src/transaction/remove.rs

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::package::{InstallReason, Package};
use crate::query::Query;
use crate::repository::{LocalRepo, Repository};

use super::TransactionState;

/// Removes packages plus the dependencies nothing else needs
///
/// Expansion grows the removal set to a fixed point: an installed package
/// that was pulled in as a dependency and whose every dependant is already
/// being removed goes too. Two safety checks can veto the plan: removing a
/// bridge that currently reconciles an installed conflict, and removing a
/// dependency some surviving package still needs. `no_deps` bypasses both
/// the closure and the checks and removes exactly what was named.
pub struct RemoveTransaction<'a> {
    local: &'a LocalRepo,
    install_root: PathBuf,
    /// Escape hatch: remove exactly the named targets, with no orphan
    /// closure and no safety checks.
    no_deps: bool,
    state: TransactionState,
    targets: BTreeSet<Package>,
    removes: Vec<Package>,
}

impl<'a> RemoveTransaction<'a> {
    pub fn new(local: &'a LocalRepo, install_root: impl Into<PathBuf>, no_deps: bool) -> Self {
        RemoveTransaction {
            local,
            install_root: install_root.into(),
            no_deps,
            state: TransactionState::Init,
            targets: BTreeSet::new(),
            removes: Vec::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Packages scheduled for removal. Valid after `expand`.
    pub fn removes(&self) -> &[Package] {
        &self.removes
    }

    pub fn add_target(&mut self, package: Package) {
        assert!(self.state == TransactionState::Init, "target added after expand");
        self.targets.insert(package);
    }

    pub fn expand(&mut self) -> Result<()> {
        assert!(self.state == TransactionState::Init, "expand called twice");

        let mut owned = self.targets.clone();
        if self.no_deps {
            self.removes = owned.into_iter().collect();
            self.state = TransactionState::Expanded;
            return Ok(());
        }

        self.absorb_orphans(&mut owned)?;
        self.check_bridges(&owned)?;
        self.check_survivors(&owned)?;

        self.removes = owned.into_iter().collect();
        self.state = TransactionState::Expanded;
        Ok(())
    }

    /// Grow `owned` until no installed dependency-reason package has all of
    /// its dependants inside it.
    fn absorb_orphans(&self, owned: &mut BTreeSet<Package>) -> Result<()> {
        loop {
            let mut grew = false;
            for package in self.local.packages()? {
                if owned.contains(&package) || package.reason() != Some(InstallReason::Dependency)
                {
                    continue;
                }
                let dependants = self.local.find_dependants(&package)?;
                if !dependants.is_empty() && dependants.iter().all(|d| owned.contains(d)) {
                    debug!("{} is orphaned by this removal", package);
                    owned.insert(package);
                    grew = true;
                }
            }
            if !grew {
                return Ok(());
            }
        }
    }

    /// Veto the plan if it removes a bridge that two surviving installed
    /// packages still need to coexist.
    fn check_bridges(&self, owned: &BTreeSet<Package>) -> Result<()> {
        let installed = self.local.packages()?;
        let mut broken = BTreeSet::new();

        for removed in owned {
            for (x, y) in &removed.bridges {
                let qx: Query = x.parse()?;
                let qy: Query = y.parse()?;
                for a in &installed {
                    for b in &installed {
                        if a == b || owned.contains(a) || owned.contains(b) {
                            continue;
                        }
                        if !(qx.matches(a) && qy.matches(b)) {
                            continue;
                        }
                        if !conflicts_between(a, b)? {
                            continue;
                        }
                        // Another surviving bridge keeps the pair legal.
                        if !self.local.find_bridges(a, b, owned)?.is_empty() {
                            continue;
                        }
                        warn!("removing {} would unbridge {} and {}", removed, a, b);
                        broken.insert(ordered(a, b));
                    }
                }
            }
        }

        if broken.is_empty() {
            Ok(())
        } else {
            Err(Error::Conflicts(broken.into_iter().collect()))
        }
    }

    /// Veto the plan if a surviving package depends on something being
    /// removed with no surviving substitute.
    fn check_survivors(&self, owned: &BTreeSet<Package>) -> Result<()> {
        let mut broken = Vec::new();
        for removed in owned {
            for survivor in self.local.packages()? {
                if owned.contains(&survivor) {
                    continue;
                }
                for dep in &survivor.dependencies {
                    let query: Query = dep.parse()?;
                    if !query.matches(removed) {
                        continue;
                    }
                    if self.local.find_package(&query, owned)?.is_none() {
                        broken.push((survivor.clone(), removed.clone()));
                    }
                }
            }
        }

        if broken.is_empty() {
            Ok(())
        } else {
            Err(Error::DependencyBreak(broken))
        }
    }

    /// Nothing to stage; the step exists so every transaction walks the same
    /// state machine.
    pub fn prepare(&mut self) -> Result<()> {
        assert!(self.state == TransactionState::Expanded, "prepare before expand");
        self.state = TransactionState::Prepared;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        assert!(self.state == TransactionState::Prepared, "commit before prepare");

        for package in &self.removes {
            let dir = package.install_dir(&self.install_root);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            self.local.remove_package(package)?;
        }

        info!("committed: {} removed", self.removes.len());
        self.state = TransactionState::Committed;
        Ok(())
    }
}

fn conflicts_between(a: &Package, b: &Package) -> Result<bool> {
    for line in &a.conflicts {
        if line.parse::<Query>()?.matches(b) {
            return Ok(true);
        }
    }
    for line in &b.conflicts {
        if line.parse::<Query>()?.matches(a) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn ordered(a: &Package, b: &Package) -> (Package, Package) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}
