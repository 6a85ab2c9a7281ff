// src/transaction/add.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::cache::DirMap;
use crate::error::{Error, Result};
use crate::extract::Extractor;
use crate::fetch::Downloader;
use crate::package::{CopyOp, InstallReason, ManifestRuntime, Package, SourceTree};
use crate::query::Query;
use crate::repository::{LocalRepo, RemoteRepo, Repository};
use crate::resolve::{CandidateChooser, ConflictFinder, DependencyGraph, Expander};

use super::{TransactionState, apply_copy_ops};

/// Installs a set of packages plus whatever they pull in
///
/// Expansion closes the targets over their dependencies, orders them, and
/// turns a same-name installed package into a scheduled remove, which is how
/// upgrades happen. Prepare fetches and unpacks sources into the caches and
/// computes every copy operation up front; commit replays them.
pub struct AddTransaction<'a> {
    local: &'a LocalRepo,
    remote: &'a RemoteRepo,
    downloader: &'a dyn Downloader,
    extractor: &'a dyn Extractor,
    runtime: &'a dyn ManifestRuntime,
    chooser: &'a dyn CandidateChooser,
    source_cache: &'a mut DirMap,
    install_root: PathBuf,
    reason: InstallReason,
    state: TransactionState,
    targets: BTreeSet<Package>,
    removes: Vec<Package>,
    installs: Vec<Package>,
    staged: BTreeMap<String, Vec<CopyOp>>,
}

impl<'a> AddTransaction<'a> {
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
        reason: InstallReason,
    ) -> Self {
        AddTransaction {
            local,
            remote,
            downloader,
            extractor,
            runtime,
            chooser,
            source_cache,
            install_root: install_root.into(),
            reason,
            state: TransactionState::Init,
            targets: BTreeSet::new(),
            removes: Vec::new(),
            installs: Vec::new(),
            staged: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Packages scheduled for installation, in install order. Valid after
    /// `expand`.
    pub fn installs(&self) -> &[Package] {
        &self.installs
    }

    /// Installed packages that will be replaced (the old side of upgrades)
    pub fn removes(&self) -> &[Package] {
        &self.removes
    }

    pub fn add_target(&mut self, package: Package) {
        assert!(self.state == TransactionState::Init, "target added after expand");
        self.targets.insert(package);
    }

    /// Resolve the full plan. On success the transaction knows exactly what
    /// it will install and replace.
    pub fn expand(&mut self) -> Result<()> {
        assert!(self.state == TransactionState::Init, "expand called twice");

        let expander = Expander::new(self.local, self.remote, self.chooser);
        let expansion = expander.expand(&self.targets, &BTreeSet::new())?;
        if !expansion.missing.is_empty() {
            return Err(Error::MissingDependencies(
                expansion.missing.into_iter().collect(),
            ));
        }

        let graph = DependencyGraph::from_packages(&expansion.resolved)?;
        if let Some(cycle) = graph.find_cycle() {
            return Err(Error::DependencyCycle(cycle));
        }

        self.installs = graph
            .install_order()
            .into_iter()
            .filter(|p| !p.is_local())
            .collect();

        // A planned install whose name is already installed is an upgrade:
        // the old version goes first and gets removed at commit.
        for package in &self.installs {
            if let Some(old) = self.local.find_literal(&Query::exact_name(&package.name))? {
                debug!("{} replaces installed {}", package, old);
                self.removes.push(old);
            }
        }

        let conflicts = ConflictFinder::find_conflicts(&self.installs, self.local)?;
        if !conflicts.is_empty() {
            return Err(Error::Conflicts(conflicts.into_iter().collect()));
        }

        self.state = TransactionState::Expanded;
        Ok(())
    }

    /// Fetch and unpack every source, then compute the copy operations for
    /// each install. Nothing under the install root or the local repository
    /// is touched.
    pub fn prepare(&mut self) -> Result<()> {
        assert!(self.state == TransactionState::Expanded, "prepare before expand");

        let mut requests = BTreeSet::new();
        for package in &self.installs {
            for source in &package.sources {
                requests.insert((source.uri.clone(), source.filename.clone()));
            }
        }
        let fetched = self.downloader.fetch(&requests)?;

        let extractor = self.extractor;
        for (uri, archive) in &fetched {
            if !self.source_cache.contains(uri) {
                self.source_cache
                    .atomic_add(uri, |staging| extractor.extract(archive, staging))?;
            }
        }

        for package in &self.installs {
            let mut tree = SourceTree::new();
            for source in &package.sources {
                tree.remap(source.name_stem(), self.source_cache.get(&source.uri)?);
            }
            let ops = self.runtime.package(package, &tree)?;
            self.staged.insert(package.name.clone(), ops);
        }

        self.state = TransactionState::Prepared;
        Ok(())
    }

    /// Apply the plan: drop replaced packages, then copy staged files and
    /// record each install.
    pub fn commit(&mut self) -> Result<()> {
        assert!(self.state == TransactionState::Prepared, "commit before prepare");

        for old in &self.removes {
            let dir = old.install_dir(&self.install_root);
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            self.local.remove_package(old)?;
        }

        for package in &self.installs {
            let dir = package.install_dir(&self.install_root);
            // A stale directory from an interrupted run must not leak files
            // into the fresh install.
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
            if let Some(ops) = self.staged.get(&package.name) {
                apply_copy_ops(&dir, ops)?;
            }

            let reason = if self.targets.contains(package) {
                self.reason
            } else {
                InstallReason::Dependency
            };
            self.local.add_package(reason, package)?;
        }

        info!(
            "committed: {} installed, {} replaced",
            self.installs.len(),
            self.removes.len()
        );
        self.state = TransactionState::Committed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ArchiveExtractor;
    use crate::package::DeclaredFiles;
    use crate::repository::testutil::write_manifest;
    use crate::resolve::FirstCandidate;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::tempdir;

    /// Downloader that serves pre-made files out of a directory keyed by URI
    /// basename, so tests never touch the network.
    struct FixtureDownloader {
        dir: PathBuf,
    }

    impl Downloader for FixtureDownloader {
        fn fetch(
            &self,
            requests: &BTreeSet<(String, String)>,
        ) -> Result<BTreeMap<String, PathBuf>> {
            let mut fetched = BTreeMap::new();
            for (uri, _filename) in requests {
                let basename = uri.rsplit('/').next().unwrap();
                let path = self.dir.join(basename);
                if !path.exists() {
                    return Err(Error::Download(format!("no fixture for {}", uri)));
                }
                fetched.insert(uri.clone(), path);
            }
            Ok(fetched)
        }
    }

    struct NoopRuntime;

    impl ManifestRuntime for NoopRuntime {
        fn package(&self, _package: &Package, _sources: &SourceTree) -> Result<Vec<CopyOp>> {
            Ok(Vec::new())
        }
    }

    struct NoopDownloader;

    impl Downloader for NoopDownloader {
        fn fetch(
            &self,
            _requests: &BTreeSet<(String, String)>,
        ) -> Result<BTreeMap<String, PathBuf>> {
            Ok(BTreeMap::new())
        }
    }

    fn make_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = fs::File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        local: LocalRepo,
        remote: RemoteRepo,
        downloader: FixtureDownloader,
        source_cache: DirMap,
        install_root: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempdir().unwrap();
        let local = LocalRepo::open(tmp.path().join("local")).unwrap();
        let remote = RemoteRepo::open(tmp.path().join("remote")).unwrap();
        let fixtures = tmp.path().join("fixtures");
        fs::create_dir_all(&fixtures).unwrap();
        let source_cache = DirMap::open(tmp.path().join("sources")).unwrap();
        let install_root = tmp.path().join("install");
        fs::create_dir_all(&install_root).unwrap();
        Fixture {
            local,
            remote,
            downloader: FixtureDownloader { dir: fixtures },
            source_cache,
            install_root,
            _tmp: tmp,
        }
    }

    #[test]
    fn test_full_install_flow() {
        let mut fx = fixture();
        make_tar_gz(
            &fx.downloader.dir.join("skyui.tar.gz"),
            &[("Data/SkyUI.esp", b"esp".as_ref())],
        );
        make_tar_gz(
            &fx.downloader.dir.join("skse.tar.gz"),
            &[("skse_loader.exe", b"bin".as_ref())],
        );
        write_manifest(
            fx.remote.root(),
            "skyui",
            json!({
                "name": "skyui", "version": "5.1",
                "depends": ["skse>=1.7"],
                "sources": ["https://example.com/dl/skyui.tar.gz::skyui.tar.gz"],
                "files": [{"from": "skyui.tar/Data", "to": "Data"}]
            }),
        );
        write_manifest(
            fx.remote.root(),
            "skse",
            json!({
                "name": "skse", "version": "1.7.3",
                "sources": ["https://example.com/dl/skse.tar.gz::skse.tar.gz"],
                "files": [{"from": "skse.tar/skse_loader.exe", "to": "skse_loader.exe"}]
            }),
        );

        let mut tx = AddTransaction::new(
            &fx.local,
            &fx.remote,
            &fx.downloader,
            &ArchiveExtractor,
            &DeclaredFiles,
            &FirstCandidate,
            &mut fx.source_cache,
            &fx.install_root,
            InstallReason::Required,
        );
        let target = fx
            .remote
            .find_literal(&"skyui".parse().unwrap())
            .unwrap()
            .unwrap();
        tx.add_target(target);

        tx.expand().unwrap();
        let names: Vec<&str> = tx.installs().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["skse", "skyui"]);
        assert!(tx.removes().is_empty());

        tx.prepare().unwrap();
        // Nothing is installed until commit.
        assert!(fx.local.packages().unwrap().is_empty());

        tx.commit().unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        assert_eq!(
            fs::read(fx.install_root.join("skyui/Data/SkyUI.esp")).unwrap(),
            b"esp"
        );
        assert_eq!(
            fs::read(fx.install_root.join("skse/skse_loader.exe")).unwrap(),
            b"bin"
        );

        let installed = fx.local.packages().unwrap();
        assert_eq!(installed.len(), 2);
        let skse = installed.iter().find(|p| p.name == "skse").unwrap();
        assert_eq!(skse.reason(), Some(InstallReason::Dependency));
        let skyui = installed.iter().find(|p| p.name == "skyui").unwrap();
        assert_eq!(skyui.reason(), Some(InstallReason::Required));
    }

    #[test]
    fn test_expand_fails_on_missing_dependency() {
        let mut fx = fixture();
        write_manifest(
            fx.remote.root(),
            "skyui",
            json!({"name": "skyui", "version": "5.1", "depends": ["nosuchthing"]}),
        );

        let mut tx = AddTransaction::new(
            &fx.local,
            &fx.remote,
            &NoopDownloader,
            &ArchiveExtractor,
            &NoopRuntime,
            &FirstCandidate,
            &mut fx.source_cache,
            &fx.install_root,
            InstallReason::Required,
        );
        let target = fx
            .remote
            .find_literal(&"skyui".parse().unwrap())
            .unwrap()
            .unwrap();
        tx.add_target(target);

        match tx.expand() {
            Err(Error::MissingDependencies(missing)) => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].0.name, "skyui");
            }
            other => panic!("expected MissingDependencies, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_expand_fails_on_cycle() {
        let mut fx = fixture();
        write_manifest(
            fx.remote.root(),
            "aa-mod",
            json!({"name": "aa-mod", "version": "1", "depends": ["bb-mod"]}),
        );
        write_manifest(
            fx.remote.root(),
            "bb-mod",
            json!({"name": "bb-mod", "version": "1", "depends": ["aa-mod"]}),
        );

        let mut tx = AddTransaction::new(
            &fx.local,
            &fx.remote,
            &NoopDownloader,
            &ArchiveExtractor,
            &NoopRuntime,
            &FirstCandidate,
            &mut fx.source_cache,
            &fx.install_root,
            InstallReason::Required,
        );
        let target = fx
            .remote
            .find_literal(&"aa-mod".parse().unwrap())
            .unwrap()
            .unwrap();
        tx.add_target(target);

        assert!(matches!(tx.expand(), Err(Error::DependencyCycle(_))));
    }

    #[test]
    fn test_expand_fails_on_conflict() {
        let mut fx = fixture();
        write_manifest(
            fx.remote.root(),
            "dark-ui",
            json!({"name": "dark-ui", "version": "1", "conflicts": ["light-ui"]}),
        );
        write_manifest(
            fx.remote.root(),
            "light-ui",
            json!({"name": "light-ui", "version": "1"}),
        );

        let mut tx = AddTransaction::new(
            &fx.local,
            &fx.remote,
            &NoopDownloader,
            &ArchiveExtractor,
            &NoopRuntime,
            &FirstCandidate,
            &mut fx.source_cache,
            &fx.install_root,
            InstallReason::Required,
        );
        for name in ["dark-ui", "light-ui"] {
            let target = fx
                .remote
                .find_literal(&name.parse().unwrap())
                .unwrap()
                .unwrap();
            tx.add_target(target);
        }

        match tx.expand() {
            Err(Error::Conflicts(pairs)) => assert_eq!(pairs.len(), 1),
            other => panic!("expected Conflicts, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_same_name_install_schedules_a_replace() {
        let mut fx = fixture();
        write_manifest(
            fx.remote.root(),
            "skyui",
            json!({"name": "skyui", "version": "5.2"}),
        );
        // Install the old version directly from a second manifest.
        let staging = fx._tmp.path().join("old");
        write_manifest(&staging, "skyui", json!({"name": "skyui", "version": "5.1"}));
        let old = crate::package::load_package(&staging.join("skyui")).unwrap();
        fx.local.add_package(InstallReason::Required, &old).unwrap();

        let mut tx = AddTransaction::new(
            &fx.local,
            &fx.remote,
            &NoopDownloader,
            &ArchiveExtractor,
            &NoopRuntime,
            &FirstCandidate,
            &mut fx.source_cache,
            &fx.install_root,
            InstallReason::Required,
        );
        // Request the new version explicitly; the installed 5.1 cannot
        // satisfy it.
        let target = fx
            .remote
            .find_literal(&"skyui>=5.2".parse().unwrap())
            .unwrap()
            .unwrap();
        tx.add_target(target);
        tx.expand().unwrap();

        assert_eq!(tx.installs().len(), 1);
        assert_eq!(tx.removes().len(), 1);
        assert_eq!(tx.removes()[0].version, "5.1".parse().unwrap());

        tx.prepare().unwrap();
        tx.commit().unwrap();

        let installed = fx.local.packages().unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].version, "5.2".parse().unwrap());
    }

    #[test]
    fn test_already_satisfied_target_is_a_no_op() {
        let mut fx = fixture();
        write_manifest(
            fx.remote.root(),
            "skyui",
            json!({"name": "skyui", "version": "5.1"}),
        );
        let package = fx
            .remote
            .find_literal(&"skyui".parse().unwrap())
            .unwrap()
            .unwrap();
        fx.local.add_package(InstallReason::Required, &package).unwrap();
        let installed = fx
            .local
            .find_literal(&"skyui".parse().unwrap())
            .unwrap()
            .unwrap();

        let mut tx = AddTransaction::new(
            &fx.local,
            &fx.remote,
            &NoopDownloader,
            &ArchiveExtractor,
            &NoopRuntime,
            &FirstCandidate,
            &mut fx.source_cache,
            &fx.install_root,
            InstallReason::Required,
        );
        tx.add_target(installed);
        tx.expand().unwrap();

        assert!(tx.installs().is_empty());
        assert!(tx.removes().is_empty());
    }
}
