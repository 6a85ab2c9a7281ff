// src/transaction/upgrade.rs

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::cache::DirMap;
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::fetch::Downloader;
use crate::package::{InstallReason, ManifestRuntime, Package};
use crate::query::Query;
use crate::repository::{LocalRepo, RemoteRepo, Repository};
use crate::resolve::CandidateChooser;

use super::{AddTransaction, TransactionState};

/// Moves installed packages to newer remote versions
///
/// An upgrade is an install of the newer version; the inner `AddTransaction`
/// schedules the matching removes itself. The extra work here is picking
/// which packages have a newer version at all, and refusing up front when a
/// version jump would strand a surviving dependant.
pub struct UpgradeTransaction<'a> {
    inner: AddTransaction<'a>,
    local: &'a LocalRepo,
    remote: &'a RemoteRepo,
    targets: BTreeSet<Package>,
}

impl<'a> UpgradeTransaction<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local: &'a LocalRepo,
        remote: &'a RemoteRepo,
        downloader: &'a dyn Downloader,
        extractor: &'a dyn Extractor,
        runtime: &'a dyn ManifestRuntime,
        chooser: &'a dyn CandidateChooser,
        source_cache: &'a mut DirMap,
        install_root: impl Into<PathBuf>,
    ) -> Self {
        UpgradeTransaction {
            inner: AddTransaction::new(
                local,
                remote,
                downloader,
                extractor,
                runtime,
                chooser,
                source_cache,
                install_root,
                InstallReason::Required,
            ),
            local,
            remote,
            targets: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.inner.state()
    }

    pub fn installs(&self) -> &[Package] {
        self.inner.installs()
    }

    pub fn removes(&self) -> &[Package] {
        self.inner.removes()
    }

    /// Restrict the upgrade to this installed package. With no targets the
    /// whole installed set is considered.
    pub fn add_target(&mut self, package: Package) {
        assert!(
            self.state() == TransactionState::Init,
            "target added after expand"
        );
        self.targets.insert(package);
    }

    pub fn expand(&mut self) -> Result<()> {
        let considered = if self.targets.is_empty() {
            self.local.packages()?
        } else {
            self.targets.iter().cloned().collect()
        };

        let mut upgrades = Vec::new();
        for installed in considered {
            let Some(remote) = self
                .remote
                .find_literal(&Query::exact_name(&installed.name))?
            else {
                continue;
            };
            if remote.version > installed.version {
                debug!("{} -> {}", installed, remote);
                upgrades.push((installed, remote));
            }
        }

        self.check_dependants(&upgrades)?;

        if upgrades.is_empty() {
            info!("everything is up to date");
        }
        for (_, newer) in upgrades {
            self.inner.add_target(newer);
        }
        self.inner.expand()
    }

    /// A version jump must not strand an installed dependant whose query the
    /// new version no longer satisfies.
    fn check_dependants(&self, upgrades: &[(Package, Package)]) -> Result<()> {
        let going: BTreeSet<Package> = upgrades.iter().map(|(old, _)| old.clone()).collect();
        let mut stranded = Vec::new();

        for (old, newer) in upgrades {
            for dependant in self.local.find_dependants(old)? {
                // Dependants being upgraded themselves get re-resolved by
                // the inner expansion.
                if going.contains(&dependant) {
                    continue;
                }
                for dep in &dependant.dependencies {
                    let query: Query = dep.parse()?;
                    if !query.matches(old) || query.matches(newer) {
                        continue;
                    }
                    if self.local.find_package(&query, &going)?.is_none() {
                        stranded.push((dependant.clone(), query));
                    }
                }
            }
        }

        if stranded.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingDependencies(stranded))
        }
    }

    pub fn prepare(&mut self) -> Result<()> {
        self.inner.prepare()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }
}
