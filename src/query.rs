// src/query.rs

//! Package constraint queries
//!
//! A query is a package name with an optional relational version constraint,
//! written `name`, `name=1.2`, `name>=2.0` and so on. Queries match a package
//! either through its own name or through one of its `provides` entries.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::package::Package;
use crate::version::Version;

// Comparator and version are both present or both absent.
static QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z0-9_-]{2,})(?:(?P<compar>[<>]=?|=)(?P<version>[0-9.]+))?$")
        .expect("query regex is valid")
});

/// Relational operator of a version constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Comparator {
    pub fn as_str(&self) -> &str {
        match self {
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Eq => "=",
        }
    }

    fn test(&self, candidate: &Version, wanted: &Version) -> bool {
        match self {
            Comparator::Lt => candidate < wanted,
            Comparator::Le => candidate <= wanted,
            Comparator::Gt => candidate > wanted,
            Comparator::Ge => candidate >= wanted,
            Comparator::Eq => candidate == wanted,
        }
    }
}

/// A name plus optional version constraint used to find a satisfying package
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Query {
    name: String,
    constraint: Option<(Comparator, Version)>,
}

impl Query {
    /// Build a query matching any version of `name`, bypassing the grammar.
    ///
    /// Used internally where the name comes from an already-loaded package
    /// rather than user input.
    pub fn exact_name(name: &str) -> Self {
        Query {
            name: name.to_string(),
            constraint: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn version_matches(&self, version: &Version) -> bool {
        match &self.constraint {
            None => true,
            Some((comparator, wanted)) => comparator.test(version, wanted),
        }
    }

    /// Does this query match the given package?
    ///
    /// The package's own name takes precedence; `provides` entries of the
    /// form `name` or `name=version` are consulted only when the literal
    /// name differs. A provides entry without a version satisfies any
    /// constraint.
    pub fn matches(&self, package: &Package) -> bool {
        if self.name == package.name {
            return self.version_matches(&package.version);
        }

        for provided in &package.provides {
            let (name, version) = match provided.split_once('=') {
                Some((name, version)) => (name, Some(version)),
                None => (provided.as_str(), None),
            };
            if name == self.name {
                return match version {
                    None => true,
                    Some(v) => match v.parse::<Version>() {
                        Ok(v) => self.version_matches(&v),
                        Err(_) => false,
                    },
                };
            }
        }
        false
    }
}

impl FromStr for Query {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = QUERY_RE
            .captures(s)
            .ok_or_else(|| Error::MalformedQuery(s.to_string()))?;

        let name = captures["name"].to_string();
        let constraint = match captures.name("compar") {
            None => None,
            Some(compar) => {
                let comparator = match compar.as_str() {
                    "<" => Comparator::Lt,
                    "<=" => Comparator::Le,
                    ">" => Comparator::Gt,
                    ">=" => Comparator::Ge,
                    "=" => Comparator::Eq,
                    _ => return Err(Error::MalformedQuery(s.to_string())),
                };
                let version = captures["version"]
                    .parse::<Version>()
                    .map_err(|_| Error::MalformedQuery(s.to_string()))?;
                Some((comparator, version))
            }
        };

        Ok(Query { name, constraint })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some((comparator, version)) = &self.constraint {
            write!(f, "{}{}", comparator.as_str(), version)?;
        }
        Ok(())
    }
}
