// src/resolve/mod.rs

//! Dependency resolution
//!
//! Three cooperating pieces turn a set of requested packages into an
//! installable plan:
//!
//! - `Expander` walks dependency queries outward until the set is closed,
//!   picking a satisfier for each query and collecting anything unsatisfiable
//! - `DependencyGraph` orders the closed set so dependencies install before
//!   their dependants, and detects cycles
//! - `ConflictFinder` checks the plan against itself and against the
//!   installed set, discounting pairs a bridge package reconciles

mod conflict;
mod expander;
mod graph;

pub use conflict::ConflictFinder;
pub use expander::{CandidateChooser, Expander, Expansion, FirstCandidate};
pub use graph::DependencyGraph;
