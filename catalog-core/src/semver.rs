//! Semantic version parsing and ordering.
//!
//! Versions follow `MAJOR.MINOR.PATCH[-prerelease][+build]` with an optional
//! leading `v`. Ordering never looks at build metadata, and a release always
//! sorts after every one of its pre-releases (`1.2.3-alpha < 1.2.3`).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::VersionError;

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^v?(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?(?:\+([0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*))?$",
    )
    .expect("version pattern must compile")
});

/// A parsed semantic version.
///
/// Equality, hashing and ordering all ignore `build`, so two versions that
/// differ only in build metadata are the same catalog identity.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre_release: Option<String>,
    pub build: Option<String>,
}

impl SemanticVersion {
    /// Create a release version with no pre-release or build metadata.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre_release: None,
            build: None,
        }
    }

    /// Parse a raw version string.
    ///
    /// Fails with [`VersionError::InvalidFormat`] unless the input is exactly
    /// three dot-separated numeric segments, optionally prefixed with `v` and
    /// optionally followed by `-<prerelease>` and/or `+<build>`.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let invalid = || VersionError::InvalidFormat {
            raw: raw.to_string(),
        };

        let caps = VERSION_PATTERN.captures(raw).ok_or_else(invalid)?;
        let segment = |idx: usize| -> Result<u64, VersionError> {
            caps.get(idx)
                .ok_or_else(invalid)?
                .as_str()
                .parse::<u64>()
                .map_err(|_| invalid())
        };

        Ok(Self {
            major: segment(1)?,
            minor: segment(2)?,
            patch: segment(3)?,
            pre_release: caps.get(4).map(|m| m.as_str().to_string()),
            build: caps.get(5).map(|m| m.as_str().to_string()),
        })
    }

    /// Attach a pre-release identifier.
    pub fn with_pre_release(mut self, pre: impl Into<String>) -> Self {
        self.pre_release = Some(pre.into());
        self
    }

    /// Attach build metadata.
    pub fn with_build(mut self, build: impl Into<String>) -> Self {
        self.build = Some(build.into());
        self
    }

    /// Three-way comparison returning -1, 0 or 1.
    pub fn compare(a: &SemanticVersion, b: &SemanticVersion) -> i32 {
        match a.cmp(b) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    pub fn next_major(&self) -> Self {
        Self::new(self.major + 1, 0, 0)
    }

    pub fn next_minor(&self) -> Self {
        Self::new(self.major, self.minor + 1, 0)
    }

    pub fn next_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre_release.is_some()
    }

    /// Whether `self` can stand in where `other` was requested.
    ///
    /// Same major version and not older; inside `0.x` the minor version is
    /// treated as the breaking component.
    pub fn is_compatible_with(&self, other: &SemanticVersion) -> bool {
        if self < other || self.major != other.major {
            return false;
        }
        self.major != 0 || self.minor == other.minor
    }

    /// Identity form used for storage and cache keys: build metadata dropped.
    pub fn canonical(&self) -> String {
        match &self.pre_release {
            Some(pre) => format!("{}.{}.{}-{}", self.major, self.minor, self.patch, pre),
            None => format!("{}.{}.{}", self.major, self.minor, self.patch),
        }
    }
}

/// Compare dot-separated pre-release identifiers.
///
/// Numeric identifiers compare numerically and sort before alphanumeric ones;
/// a shorter identifier list sorts first when all shared fields are equal.
fn compare_pre_release(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_identifier(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_identifier(x: &str, y: &str) -> Ordering {
    let x_numeric = !x.is_empty() && x.bytes().all(|b| b.is_ascii_digit());
    let y_numeric = !y.is_empty() && y.bytes().all(|b| b.is_ascii_digit());
    match (x_numeric, y_numeric) {
        (true, true) => {
            // Compare by digit count first so arbitrarily long numbers work.
            let x_trim = x.trim_start_matches('0');
            let y_trim = y.trim_start_matches('0');
            x_trim
                .len()
                .cmp(&y_trim.len())
                .then_with(|| x_trim.cmp(y_trim))
                .then_with(|| x.cmp(y))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.cmp(y),
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.pre_release, &other.pre_release) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_pre_release(a, b),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl Hash for SemanticVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{}", pre)?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for SemanticVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

// =============================================================================
// TESTS
// =============================================================================
