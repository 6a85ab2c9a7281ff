// src/resolve/graph.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::Result;
use crate::package::Package;
use crate::query::Query;

/// Dependency edges within a resolved set
///
/// Edges point from dependant to dependency. Queries with no satisfier
/// inside the set get no edge; the expander has already established they are
/// met by the installed set.
pub struct DependencyGraph {
    graph: DiGraph<Package, ()>,
}

impl DependencyGraph {
    pub fn from_packages<'a, I>(packages: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Package> + Clone,
    {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        for package in packages.clone() {
            nodes.insert(&package.name, graph.add_node(package.clone()));
        }
        for package in packages.clone() {
            let from = nodes[package.name.as_str()];
            for dep in &package.dependencies {
                let query: Query = dep.parse()?;
                if let Some(satisfier) = packages.clone().into_iter().find(|c| query.matches(c)) {
                    graph.add_edge(from, nodes[satisfier.name.as_str()], ());
                }
            }
        }
        Ok(DependencyGraph { graph })
    }

    /// The packages of one dependency cycle, if any exists. A package that
    /// satisfies one of its own queries counts as a cycle of one.
    pub fn find_cycle(&self) -> Option<Vec<Package>> {
        for edge in self.graph.edge_indices() {
            if let Some((a, b)) = self.graph.edge_endpoints(edge) {
                if a == b {
                    return Some(vec![self.graph[a].clone()]);
                }
            }
        }
        for scc in tarjan_scc(&self.graph) {
            if scc.len() > 1 {
                let mut members: Vec<Package> =
                    scc.into_iter().map(|i| self.graph[i].clone()).collect();
                members.sort();
                return Some(members);
            }
        }
        None
    }

    /// Topological install order: every dependency before its dependants.
    ///
    /// Among packages whose dependencies are all placed, lower priority goes
    /// first and ties break by name, so the order is fully deterministic.
    /// Only meaningful when `find_cycle` returned `None`; cycle members are
    /// silently left out otherwise.
    pub fn install_order(&self) -> Vec<Package> {
        let mut remaining_deps: HashMap<NodeIndex, usize> = HashMap::new();
        let mut ready = BinaryHeap::new();
        for idx in self.graph.node_indices() {
            let deps = self.graph.edges_directed(idx, Direction::Outgoing).count();
            remaining_deps.insert(idx, deps);
            if deps == 0 {
                let p = &self.graph[idx];
                ready.push(Reverse((p.priority, p.name.clone(), idx)));
            }
        }

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, _, idx))) = ready.pop() {
            order.push(self.graph[idx].clone());
            for dependant in self.graph.neighbors_directed(idx, Direction::Incoming) {
                if let Some(deps) = remaining_deps.get_mut(&dependant) {
                    *deps -= 1;
                    if *deps == 0 {
                        let p = &self.graph[dependant];
                        ready.push(Reverse((p.priority, p.name.clone(), dependant)));
                    }
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str, deps: &[&str]) -> Package {
        let mut p = Package::for_tests(name, "1.0");
        p.dependencies = deps.iter().map(|d| d.to_string()).collect();
        p
    }

    #[test]
    fn test_install_order_puts_dependencies_first() {
        let packages = vec![
            pkg("skyui", &["skse"]),
            pkg("skse", &["engine-fixes"]),
            pkg("engine-fixes", &[]),
        ];
        let graph = DependencyGraph::from_packages(&packages).unwrap();

        assert!(graph.find_cycle().is_none());
        let order: Vec<String> = graph.install_order().into_iter().map(|p| p.name).collect();
        assert_eq!(order, vec!["engine-fixes", "skse", "skyui"]);
    }

    #[test]
    fn test_independent_packages_order_by_priority_then_name() {
        let mut high = pkg("zz-late", &[]);
        high.priority = 5;
        let packages = vec![pkg("bb", &[]), pkg("aa", &[]), high];

        let graph = DependencyGraph::from_packages(&packages).unwrap();
        let order: Vec<String> = graph.install_order().into_iter().map(|p| p.name).collect();
        assert_eq!(order, vec!["aa", "bb", "zz-late"]);
    }

    #[test]
    fn test_cycle_is_detected() {
        let packages = vec![pkg("aa", &["bb"]), pkg("bb", &["cc"]), pkg("cc", &["aa"])];
        let graph = DependencyGraph::from_packages(&packages).unwrap();

        let cycle = graph.find_cycle().unwrap();
        let names: Vec<String> = cycle.into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["aa", "bb", "cc"]);
    }

    #[test]
    fn test_self_satisfying_package_is_a_cycle() {
        let mut p = pkg("aa", &["ui-framework"]);
        p.provides = vec!["ui-framework".to_string()];
        let packages = vec![p];

        let graph = DependencyGraph::from_packages(&packages).unwrap();
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.len(), 1);
        assert_eq!(cycle[0].name, "aa");
    }

    #[test]
    fn test_outside_satisfied_queries_get_no_edge() {
        // skse is satisfied by the installed set, not by this plan.
        let packages = vec![pkg("skyui", &["skse"])];
        let graph = DependencyGraph::from_packages(&packages).unwrap();

        assert!(graph.find_cycle().is_none());
        assert_eq!(graph.install_order().len(), 1);
    }

    #[test]
    fn test_provides_edges_participate_in_ordering() {
        let mut provider = pkg("legacy-ui", &[]);
        provider.provides = vec!["skyui".to_string()];
        let packages = vec![pkg("some-mod", &["skyui"]), provider];

        let graph = DependencyGraph::from_packages(&packages).unwrap();
        let order: Vec<String> = graph.install_order().into_iter().map(|p| p.name).collect();
        assert_eq!(order, vec!["legacy-ui", "some-mod"]);
    }
}
