//! Version range matching for release edges.
//!
//! A range is one or more alternatives separated by `||`; an alternative is
//! a whitespace-separated list of comparators that must all hold:
//!
//! ```
//! use update_graph::VersionRange;
//!
//! let range = VersionRange::parse(">=1.12.0 <=1.14.0-phase1").unwrap();
//! assert!(range.matches_str("v1.13.0").unwrap());
//! assert!(range.matches_str("1.14.0-phase1").unwrap());
//! assert!(!range.matches_str("1.14.0").unwrap());
//! ```
//!
//! Pre-release versions order before their release (`1.14.0-phase1 <
//! 1.14.0-phase2 < 1.14.0`), and are compared like any other version.

use crate::error::{GraphError, Result};
use semver::Version;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Gte,
    Gt,
    Lte,
    Lt,
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: CompareOp,
    version: Version,
}

impl Comparator {
    fn matches(&self, candidate: &Version) -> bool {
        match self.op {
            CompareOp::Gte => candidate >= &self.version,
            CompareOp::Gt => candidate > &self.version,
            CompareOp::Lte => candidate <= &self.version,
            CompareOp::Lt => candidate < &self.version,
            CompareOp::Eq => candidate == &self.version,
            CompareOp::Ne => candidate != &self.version,
        }
    }
}

/// A parsed version range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    alternatives: Vec<Vec<Comparator>>,
    raw: String,
}

impl VersionRange {
    /// Parses a range such as `>=1.2.0 <2.0.0 || 3.0.0`.
    ///
    /// A comparator without an operator means equality.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidRange`] for an empty range or alternative,
    /// or for a comparator whose version does not parse.
    pub fn parse(range: &str) -> Result<Self> {
        let invalid = |reason: String| GraphError::InvalidRange {
            range: range.to_string(),
            reason,
        };

        let mut alternatives = Vec::new();
        for alternative in range.split("||") {
            let comparators = alternative
                .split_whitespace()
                .map(|c| parse_comparator(c).map_err(&invalid))
                .collect::<Result<Vec<_>>>()?;
            if comparators.is_empty() {
                return Err(invalid("empty comparator set".to_string()));
            }
            alternatives.push(comparators);
        }

        Ok(Self {
            alternatives,
            raw: range.to_string(),
        })
    }

    /// Whether `version` falls inside the range.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|set| set.iter().all(|c| c.matches(version)))
    }

    /// Parses `version` (a leading `v` is allowed) and checks it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::InvalidVersion`] if `version` does not parse.
    pub fn matches_str(&self, version: &str) -> Result<bool> {
        Ok(self.matches(&parse_version(version)?))
    }

    /// The range as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parses a release version, accepting a leading `v` and a missing patch
/// component.
///
/// # Errors
///
/// Returns [`GraphError::InvalidVersion`] if the text is not a version.
pub fn parse_version(version: &str) -> Result<Version> {
    let trimmed = version.trim();
    let bare = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(bare)
        .or_else(|_| Version::parse(&format!("{bare}.0")))
        .map_err(|_| GraphError::InvalidVersion(version.to_string()))
}

fn parse_comparator(s: &str) -> std::result::Result<Comparator, String> {
    let (op, version) = if let Some(rest) = s.strip_prefix(">=") {
        (CompareOp::Gte, rest)
    } else if let Some(rest) = s.strip_prefix("<=") {
        (CompareOp::Lte, rest)
    } else if let Some(rest) = s.strip_prefix("!=") {
        (CompareOp::Ne, rest)
    } else if let Some(rest) = s.strip_prefix("==") {
        (CompareOp::Eq, rest)
    } else if let Some(rest) = s.strip_prefix('>') {
        (CompareOp::Gt, rest)
    } else if let Some(rest) = s.strip_prefix('<') {
        (CompareOp::Lt, rest)
    } else if let Some(rest) = s.strip_prefix('=') {
        (CompareOp::Eq, rest)
    } else {
        (CompareOp::Eq, s)
    };

    let version = parse_version(version).map_err(|_| format!("invalid version in '{s}'"))?;
    Ok(Comparator { op, version })
}
