// src/error.rs

use std::path::PathBuf;

use thiserror::Error;

use crate::package::Package;
use crate::query::Query;

/// Core error types for modkeep
///
/// Resolution failures carry their full structured payload (the offending
/// packages, queries or pairs) so callers can render remediation instead of
/// re-deriving it from a message string.
#[derive(Error, Debug)]
pub enum Error {
    /// A query string that does not conform to `name[<op><version>]`
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// Dependency queries for which no satisfier exists anywhere
    #[error("{} unresolved {}", .0.len(), plural(.0.len(), "dependency", "dependencies"))]
    MissingDependencies(Vec<(Package, Query)>),

    /// The resolved closure contains a dependency cycle
    #[error("dependency cycle: {}", format_package_list(.0))]
    DependencyCycle(Vec<Package>),

    /// Conflicting package pairs with no bridge
    #[error("{} unresolved {}", .0.len(), plural(.0.len(), "conflict", "conflicts"))]
    Conflicts(Vec<(Package, Package)>),

    /// Removing these packages would leave a dependant without its dependency
    #[error("{} {} would break", .0.len(), plural(.0.len(), "dependency", "dependencies"))]
    DependencyBreak(Vec<(Package, Package)>),

    /// Cache key or local package record already present
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Cache key or local package record absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad or unreadable package manifest
    #[error("manifest error in {path}: {reason}", path = .path.display())]
    Manifest { path: PathBuf, reason: String },

    /// Packaging step referenced a path outside the staged sources
    #[error("cannot translate path: {0}")]
    PathTranslation(String),

    /// Archive format the extractor does not understand
    #[error("unsupported archive format: {}", .0.display())]
    UnsupportedArchive(PathBuf),

    /// Download failure after retries
    #[error("download error: {0}")]
    Download(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors (manifests, install metadata, config)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn plural<'a>(n: usize, one: &'a str, many: &'a str) -> &'a str {
    if n == 1 { one } else { many }
}

fn format_package_list(packages: &[Package]) -> String {
    packages
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Result type alias using modkeep's Error type
pub type Result<T> = std::result::Result<T, Error>;
