// src/version.rs

//! Package version values
//!
//! Versions are dot-separated non-negative integers (`1`, `1.2`, `2.0.14`).
//! Ordering compares components pairwise left to right. When one version is
//! a strict prefix of the other, the shorter one orders first: `1.2 < 1.2.1`.
//! Missing trailing components are absent, not zero, so `1.2` and `1.2.0`
//! are distinct (and `1.2 < 1.2.0`). This is the one explicit rule for the
//! whole crate; nothing zero-pads.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A comparable package version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(Vec<u64>);

impl Version {
    /// The numeric components, most significant first
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| Error::MalformedQuery(format!("bad version component {:?} in {:?}", part, s)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Version(components))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        // Shared prefix is equal; the shorter version orders first.
        self.0.len().cmp(&other.0.len())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", c)?;
            first = false;
        }
        Ok(())
    }
}
