//! Version constraints declared on dependencies.
//!
//! Supported forms: `*` (or empty), `=X`, `>X`, `>=X`, `<X`, `<=X`, `^X`,
//! `~X`, and comma-separated conjunctions such as `>=1.2.0, <2.0.0`. A bare
//! version is an exact match.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{SemanticVersion, VersionError};

/// A single comparison against a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparator {
    Exact(SemanticVersion),
    Greater(SemanticVersion),
    GreaterEq(SemanticVersion),
    Less(SemanticVersion),
    LessEq(SemanticVersion),
    /// Compatible updates: `^1.2.3` allows `>=1.2.3, <2.0.0`.
    Caret(SemanticVersion),
    /// Patch-level updates: `~1.2.3` allows `>=1.2.3, <1.3.0`.
    Tilde(SemanticVersion),
}

impl Comparator {
    fn version(&self) -> &SemanticVersion {
        match self {
            Comparator::Exact(v)
            | Comparator::Greater(v)
            | Comparator::GreaterEq(v)
            | Comparator::Less(v)
            | Comparator::LessEq(v)
            | Comparator::Caret(v)
            | Comparator::Tilde(v) => v,
        }
    }

    fn matches(&self, candidate: &SemanticVersion) -> bool {
        match self {
            Comparator::Exact(v) => candidate == v,
            Comparator::Greater(v) => candidate > v,
            Comparator::GreaterEq(v) => candidate >= v,
            Comparator::Less(v) => candidate < v,
            Comparator::LessEq(v) => candidate <= v,
            Comparator::Caret(v) => {
                let upper = if v.major > 0 {
                    v.next_major()
                } else if v.minor > 0 {
                    v.next_minor()
                } else {
                    v.next_patch()
                };
                candidate >= v && *candidate < upper
            }
            Comparator::Tilde(v) => candidate >= v && *candidate < v.next_minor(),
        }
    }
}

/// A parsed constraint. An empty comparator list matches every version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    raw: String,
    comparators: Vec<Comparator>,
}

impl VersionConstraint {
    /// Constraint that accepts any version.
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            comparators: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self {
                raw: trimmed.to_string(),
                comparators: Vec::new(),
            });
        }

        let comparators = trimmed
            .split(',')
            .map(|part| parse_comparator(part.trim(), raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: trimmed.to_string(),
            comparators,
        })
    }

    pub fn comparators(&self) -> &[Comparator] {
        &self.comparators
    }

    pub fn is_any(&self) -> bool {
        self.comparators.is_empty()
    }

    /// Whether `candidate` satisfies every comparator.
    ///
    /// A pre-release only matches when some comparator names a pre-release
    /// of the same `major.minor.patch`; otherwise pre-releases are skipped.
    pub fn matches(&self, candidate: &SemanticVersion) -> bool {
        if candidate.is_prerelease() {
            let opted_in = self.comparators.iter().any(|c| {
                let v = c.version();
                v.is_prerelease()
                    && v.major == candidate.major
                    && v.minor == candidate.minor
                    && v.patch == candidate.patch
            });
            if !opted_in {
                return false;
            }
        }
        self.comparators.iter().all(|c| c.matches(candidate))
    }
}

fn parse_comparator(part: &str, raw: &str) -> Result<Comparator, VersionError> {
    let invalid = || VersionError::InvalidConstraint {
        raw: raw.to_string(),
    };
    if part.is_empty() {
        return Err(invalid());
    }

    let (op, rest) = [">=", "<=", ">", "<", "=", "^", "~"]
        .iter()
        .find_map(|op| part.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("", part));

    let version = SemanticVersion::parse(rest.trim()).map_err(|_| invalid())?;
    Ok(match op {
        ">=" => Comparator::GreaterEq(version),
        "<=" => Comparator::LessEq(version),
        ">" => Comparator::Greater(version),
        "<" => Comparator::Less(version),
        "^" => Comparator::Caret(version),
        "~" => Comparator::Tilde(version),
        _ => Comparator::Exact(version),
    })
}

impl Default for VersionConstraint {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for VersionConstraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionConstraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}
