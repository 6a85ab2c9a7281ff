// src/resolve/expander.rs

use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use crate::error::Result;
use crate::package::Package;
use crate::query::Query;
use crate::repository::Repository;

/// Picks one satisfier when a query matches several remote packages and
/// scoring could not separate them.
pub trait CandidateChooser {
    /// `candidates` is non-empty and sorted by name
    fn choose(&self, query: &Query, candidates: Vec<Package>) -> Result<Package>;
}

/// Chooser that takes the first candidate in name order. Used wherever no
/// interactive session is available.
#[derive(Debug, Default)]
pub struct FirstCandidate;

impl CandidateChooser for FirstCandidate {
    fn choose(&self, _query: &Query, mut candidates: Vec<Package>) -> Result<Package> {
        Ok(candidates.remove(0))
    }
}

/// Result of closing a target set over its dependencies
#[derive(Debug, Default)]
pub struct Expansion {
    /// The closed set: targets, chosen satisfiers and the installed packages
    /// that satisfied a query along the way
    pub resolved: BTreeSet<Package>,
    /// Queries no repository could satisfy, with the package that needed them
    pub missing: BTreeSet<(Package, Query)>,
}

/// Worklist closure of dependency queries
///
/// For each query the satisfier search runs in priority order: the resolved
/// set itself, then the installed set, then the remote repository. A remote
/// query with several satisfiers is scored by how much of each candidate's
/// own dependency list is already met locally; only a tie at the best score
/// reaches the chooser.
pub struct Expander<'a> {
    local: &'a dyn Repository,
    remote: &'a dyn Repository,
    chooser: &'a dyn CandidateChooser,
}

impl<'a> Expander<'a> {
    pub fn new(
        local: &'a dyn Repository,
        remote: &'a dyn Repository,
        chooser: &'a dyn CandidateChooser,
    ) -> Self {
        Expander {
            local,
            remote,
            chooser,
        }
    }

    /// Close `targets` over their dependencies. Packages in `exclude` are
    /// never picked as satisfiers (the caller passes packages it is about to
    /// remove).
    pub fn expand(
        &self,
        targets: &BTreeSet<Package>,
        exclude: &BTreeSet<Package>,
    ) -> Result<Expansion> {
        let mut expansion = Expansion {
            resolved: targets.clone(),
            missing: BTreeSet::new(),
        };
        let mut worklist: VecDeque<Package> = targets.iter().cloned().collect();

        while let Some(package) = worklist.pop_front() {
            // Installed packages had their dependencies satisfied at install
            // time; expanding them again would only re-resolve the world.
            if package.is_local() {
                continue;
            }
            for dep in &package.dependencies {
                let query: Query = dep.parse()?;
                if expansion.resolved.iter().any(|p| query.matches(p)) {
                    continue;
                }
                if let Some(installed) = self.local.find_package(&query, exclude)? {
                    debug!("{} satisfied by installed {}", query, installed);
                    expansion.resolved.insert(installed);
                    continue;
                }
                match self.pick_remote(&query, exclude)? {
                    Some(chosen) => {
                        debug!("{} satisfied by remote {}", query, chosen);
                        expansion.resolved.insert(chosen.clone());
                        worklist.push_back(chosen);
                    }
                    None => {
                        expansion.missing.insert((package.clone(), query));
                    }
                }
            }
        }
        Ok(expansion)
    }

    fn pick_remote(&self, query: &Query, exclude: &BTreeSet<Package>) -> Result<Option<Package>> {
        let candidates = self.remote.find_packages(query, exclude)?;
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.into_iter().next()),
            _ => {
                let mut scored = Vec::with_capacity(candidates.len());
                for candidate in candidates {
                    let score = self.unmet_ratio(&candidate)?;
                    scored.push((score, candidate));
                }
                scored.sort_by(|(sa, pa), (sb, pb)| {
                    sa.total_cmp(sb).then_with(|| pa.cmp(pb))
                });
                let best = scored[0].0;
                let tied: Vec<Package> = scored
                    .into_iter()
                    .take_while(|(s, _)| *s == best)
                    .map(|(_, p)| p)
                    .collect();
                if tied.len() == 1 {
                    Ok(tied.into_iter().next())
                } else {
                    self.chooser.choose(query, tied).map(Some)
                }
            }
        }
    }

    /// Fraction of a candidate's dependency queries with no installed
    /// satisfier. Lower means cheaper to pull in.
    fn unmet_ratio(&self, candidate: &Package) -> Result<f64> {
        if candidate.dependencies.is_empty() {
            return Ok(0.0);
        }
        let mut unmet = 0usize;
        for dep in &candidate.dependencies {
            let query: Query = dep.parse()?;
            if self.local.find_package(&query, &BTreeSet::new())?.is_none() {
                unmet += 1;
            }
        }
        Ok(unmet as f64 / candidate.dependencies.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::package::InstallReason;
    use crate::repository::testutil::write_manifest;
    use crate::repository::{LocalRepo, RemoteRepo};
    use serde_json::json;
    use tempfile::tempdir;

    struct Refusing;

    impl CandidateChooser for Refusing {
        fn choose(&self, query: &Query, _candidates: Vec<Package>) -> Result<Package> {
            Err(Error::MalformedQuery(format!("chooser reached for {}", query)))
        }
    }

    fn repos(tmp: &tempfile::TempDir) -> (LocalRepo, RemoteRepo) {
        (
            LocalRepo::open(tmp.path().join("local")).unwrap(),
            RemoteRepo::open(tmp.path().join("remote")).unwrap(),
        )
    }

    fn targets(repo: &RemoteRepo, names: &[&str]) -> BTreeSet<Package> {
        names
            .iter()
            .map(|n| repo.find_literal(&n.parse().unwrap()).unwrap().unwrap())
            .collect()
    }

    #[test]
    fn test_expand_transitive_closure() {
        let tmp = tempdir().unwrap();
        let (local, remote) = repos(&tmp);
        write_manifest(
            remote.root(),
            "skyui",
            json!({"name": "skyui", "version": "5.1", "depends": ["skse>=1.7"]}),
        );
        write_manifest(
            remote.root(),
            "skse",
            json!({"name": "skse", "version": "1.7.3", "depends": ["engine-fixes"]}),
        );
        write_manifest(
            remote.root(),
            "engine-fixes",
            json!({"name": "engine-fixes", "version": "4.8"}),
        );

        let expander = Expander::new(&local, &remote, &FirstCandidate);
        let expansion = expander
            .expand(&targets(&remote, &["skyui"]), &BTreeSet::new())
            .unwrap();

        assert!(expansion.missing.is_empty());
        let names: Vec<&str> = expansion.resolved.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["engine-fixes", "skse", "skyui"]);
    }

    #[test]
    fn test_installed_satisfier_stops_the_walk() {
        let tmp = tempdir().unwrap();
        let (local, remote) = repos(&tmp);
        write_manifest(
            remote.root(),
            "skyui",
            json!({"name": "skyui", "version": "5.1", "depends": ["skse>=1.7"]}),
        );
        // skse is installed and itself depends on something that exists
        // nowhere; its dependencies must not be re-expanded.
        write_manifest(
            remote.root(),
            "skse",
            json!({"name": "skse", "version": "1.7.3", "depends": ["nosuchthing"]}),
        );
        let skse = remote.find_literal(&"skse".parse().unwrap()).unwrap().unwrap();
        local.add_package(InstallReason::Required, &skse).unwrap();

        let expander = Expander::new(&local, &remote, &FirstCandidate);
        let expansion = expander
            .expand(&targets(&remote, &["skyui"]), &BTreeSet::new())
            .unwrap();

        assert!(expansion.missing.is_empty());
        assert_eq!(expansion.resolved.len(), 2);
        let skse = expansion
            .resolved
            .iter()
            .find(|p| p.name == "skse")
            .unwrap();
        assert!(skse.is_local());
    }

    #[test]
    fn test_missing_dependency_is_reported_with_its_dependant() {
        let tmp = tempdir().unwrap();
        let (local, remote) = repos(&tmp);
        write_manifest(
            remote.root(),
            "skyui",
            json!({"name": "skyui", "version": "5.1", "depends": ["skse>=99.0"]}),
        );
        write_manifest(remote.root(), "skse", json!({"name": "skse", "version": "1.7.3"}));

        let expander = Expander::new(&local, &remote, &FirstCandidate);
        let expansion = expander
            .expand(&targets(&remote, &["skyui"]), &BTreeSet::new())
            .unwrap();

        assert_eq!(expansion.missing.len(), 1);
        let (dependant, query) = expansion.missing.first().unwrap();
        assert_eq!(dependant.name, "skyui");
        assert_eq!(query.to_string(), "skse>=99.0");
    }

    #[test]
    fn test_scoring_separates_providers_without_the_chooser() {
        let tmp = tempdir().unwrap();
        let (local, remote) = repos(&tmp);
        write_manifest(
            remote.root(),
            "some-mod",
            json!({"name": "some-mod", "version": "1", "depends": ["ui-framework"]}),
        );
        // Two providers; the cheap one has no unmet dependencies.
        write_manifest(
            remote.root(),
            "heavy-ui",
            json!({
                "name": "heavy-ui", "version": "2",
                "provides": ["ui-framework"], "depends": ["skse", "engine-fixes"]
            }),
        );
        write_manifest(
            remote.root(),
            "light-ui",
            json!({"name": "light-ui", "version": "1", "provides": ["ui-framework"]}),
        );

        let expander = Expander::new(&local, &remote, &Refusing);
        let expansion = expander
            .expand(&targets(&remote, &["some-mod"]), &BTreeSet::new())
            .unwrap();

        assert!(expansion.resolved.iter().any(|p| p.name == "light-ui"));
        assert!(!expansion.resolved.iter().any(|p| p.name == "heavy-ui"));
    }

    #[test]
    fn test_tied_providers_reach_the_chooser() {
        let tmp = tempdir().unwrap();
        let (local, remote) = repos(&tmp);
        write_manifest(
            remote.root(),
            "some-mod",
            json!({"name": "some-mod", "version": "1", "depends": ["ui-framework"]}),
        );
        write_manifest(
            remote.root(),
            "ui-one",
            json!({"name": "ui-one", "version": "1", "provides": ["ui-framework"]}),
        );
        write_manifest(
            remote.root(),
            "ui-two",
            json!({"name": "ui-two", "version": "1", "provides": ["ui-framework"]}),
        );

        struct PickSecond;
        impl CandidateChooser for PickSecond {
            fn choose(&self, _query: &Query, mut candidates: Vec<Package>) -> Result<Package> {
                assert_eq!(candidates.len(), 2);
                Ok(candidates.remove(1))
            }
        }

        let expander = Expander::new(&local, &remote, &PickSecond);
        let expansion = expander
            .expand(&targets(&remote, &["some-mod"]), &BTreeSet::new())
            .unwrap();

        assert!(expansion.resolved.iter().any(|p| p.name == "ui-two"));
        assert!(!expansion.resolved.iter().any(|p| p.name == "ui-one"));
    }

    #[test]
    fn test_excluded_packages_are_not_satisfiers() {
        let tmp = tempdir().unwrap();
        let (local, remote) = repos(&tmp);
        write_manifest(
            remote.root(),
            "skyui",
            json!({"name": "skyui", "version": "5.1", "depends": ["skse"]}),
        );
        write_manifest(remote.root(), "skse", json!({"name": "skse", "version": "1.7.3"}));

        let mut exclude = BTreeSet::new();
        exclude.insert(Package::for_tests("skse", "1.7.3"));

        let expander = Expander::new(&local, &remote, &FirstCandidate);
        let expansion = expander
            .expand(&targets(&remote, &["skyui"]), &exclude)
            .unwrap();

        assert_eq!(expansion.missing.len(), 1);
    }
}
