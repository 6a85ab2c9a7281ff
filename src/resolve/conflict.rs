// src/resolve/conflict.rs

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::Result;
use crate::package::Package;
use crate::query::Query;
use crate::repository::Repository;

/// Conflict scan over an install plan
///
/// Conflicts are checked in both directions between the plan and the
/// installed set, and within the plan itself. A pair is then discounted when
/// a bridge reconciles it, whether the bridge is already installed or part
/// of the plan.
pub struct ConflictFinder;

impl ConflictFinder {
    /// Every unreconciled conflicting pair, each ordered by name
    pub fn find_conflicts(
        candidates: &[Package],
        local: &dyn Repository,
    ) -> Result<BTreeSet<(Package, Package)>> {
        let installed = local.packages()?;

        let mut pairs = BTreeSet::new();
        // The plan against itself and against the installed set.
        for package in candidates {
            for line in &package.conflicts {
                let query: Query = line.parse()?;
                for other in candidates.iter().chain(installed.iter()) {
                    if other != package && query.matches(other) {
                        pairs.insert(ordered(package, other));
                    }
                }
            }
        }
        // Installed conflict declarations against the plan.
        for package in &installed {
            for line in &package.conflicts {
                let query: Query = line.parse()?;
                for other in candidates {
                    if other != package && query.matches(other) {
                        pairs.insert(ordered(package, other));
                    }
                }
            }
        }

        let mut conflicts = BTreeSet::new();
        for (a, b) in pairs {
            if Self::is_bridged(&a, &b, candidates, local)? {
                debug!("conflict {} / {} reconciled by a bridge", a, b);
            } else {
                conflicts.insert((a, b));
            }
        }
        Ok(conflicts)
    }

    fn is_bridged(
        a: &Package,
        b: &Package,
        candidates: &[Package],
        local: &dyn Repository,
    ) -> Result<bool> {
        if !local.find_bridges(a, b, &BTreeSet::new())?.is_empty() {
            return Ok(true);
        }
        for candidate in candidates {
            for (x, y) in &candidate.bridges {
                let qx: Query = x.parse()?;
                let qy: Query = y.parse()?;
                if (qx.matches(a) && qy.matches(b)) || (qy.matches(a) && qx.matches(b)) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

fn ordered(a: &Package, b: &Package) -> (Package, Package) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::InstallReason;
    use crate::repository::testutil::write_manifest;
    use crate::repository::{LocalRepo, RemoteRepo};
    use serde_json::json;
    use tempfile::tempdir;

    fn conflicting(name: &str, with: &str) -> Package {
        let mut p = Package::for_tests(name, "1.0");
        p.conflicts = vec![with.to_string()];
        p
    }

    fn install(tmp: &tempfile::TempDir, local: &LocalRepo, body: serde_json::Value) {
        let staging = tmp.path().join("staging");
        let name = body["name"].as_str().unwrap().to_string();
        write_manifest(&staging, &name, body);
        let remote = RemoteRepo::open(&staging).unwrap();
        let package = remote
            .find_literal(&Query::exact_name(&name))
            .unwrap()
            .unwrap();
        local.add_package(InstallReason::Required, &package).unwrap();
    }

    #[test]
    fn test_conflict_within_the_plan() {
        let tmp = tempdir().unwrap();
        let local = LocalRepo::open(tmp.path().join("local")).unwrap();

        let candidates = vec![conflicting("dark-ui", "light-ui"), Package::for_tests("light-ui", "1.0")];
        let conflicts = ConflictFinder::find_conflicts(&candidates, &local).unwrap();

        assert_eq!(conflicts.len(), 1);
        let (a, b) = conflicts.first().unwrap();
        assert_eq!((a.name.as_str(), b.name.as_str()), ("dark-ui", "light-ui"));
    }

    #[test]
    fn test_conflict_against_installed_in_both_directions() {
        let tmp = tempdir().unwrap();
        let local = LocalRepo::open(tmp.path().join("local")).unwrap();
        install(&tmp, &local, json!({"name": "light-ui", "version": "1.0"}));

        // The plan declares the conflict.
        let conflicts =
            ConflictFinder::find_conflicts(&[conflicting("dark-ui", "light-ui")], &local).unwrap();
        assert_eq!(conflicts.len(), 1);

        // The installed package declares it.
        let tmp2 = tempdir().unwrap();
        let local2 = LocalRepo::open(tmp2.path().join("local")).unwrap();
        install(
            &tmp2,
            &local2,
            json!({"name": "light-ui", "version": "1.0", "conflicts": ["dark-ui"]}),
        );
        let conflicts =
            ConflictFinder::find_conflicts(&[Package::for_tests("dark-ui", "1.0")], &local2).unwrap();
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn test_versioned_conflict_respects_constraint() {
        let tmp = tempdir().unwrap();
        let local = LocalRepo::open(tmp.path().join("local")).unwrap();

        let candidates = vec![
            conflicting("dark-ui", "light-ui<2.0"),
            Package::for_tests("light-ui", "2.1"),
        ];
        assert!(ConflictFinder::find_conflicts(&candidates, &local)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_candidate_bridge_reconciles() {
        let tmp = tempdir().unwrap();
        let local = LocalRepo::open(tmp.path().join("local")).unwrap();

        let mut shim = Package::for_tests("compat-shim", "1.0");
        shim.bridges = vec![("dark-ui".to_string(), "light-ui".to_string())];

        let candidates = vec![
            conflicting("dark-ui", "light-ui"),
            Package::for_tests("light-ui", "1.0"),
            shim,
        ];
        assert!(ConflictFinder::find_conflicts(&candidates, &local)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_installed_bridge_reconciles() {
        let tmp = tempdir().unwrap();
        let local = LocalRepo::open(tmp.path().join("local")).unwrap();
        install(
            &tmp,
            &local,
            json!({"name": "compat-shim", "version": "1.0", "bridges": ["dark-ui::light-ui"]}),
        );

        let candidates = vec![
            conflicting("dark-ui", "light-ui"),
            Package::for_tests("light-ui", "1.0"),
        ];
        assert!(ConflictFinder::find_conflicts(&candidates, &local)
            .unwrap()
            .is_empty());
    }
}
