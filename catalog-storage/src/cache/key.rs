//! Typed cache keys.
//!
//! A `CacheKey` can only be built through [`CacheKey::component`] or
//! [`CacheKey::latest`], so every cache entry belongs to exactly one of the
//! two entry classes and carries the TTL class that goes with it.

use std::fmt;

use catalog_core::SemanticVersion;

const COMPONENT_PREFIX: &str = "component";
const LATEST_PREFIX: &str = "latest";
const SEPARATOR: char = ':';

/// Which kind of entry a key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEntryClass {
    /// Exact `(name, version)` record; immutable once written.
    Component,
    /// Pointer to the current latest version of a name.
    Latest,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKeyInner {
    Component { name: String, version: String },
    Latest { name: String },
}

impl CacheKey {
    /// Key for an exact version: `component:{name}:{version}`.
    ///
    /// Uses the canonical version so build metadata never splits an entry.
    pub fn component(name: &str, version: &SemanticVersion) -> Self {
        Self {
            inner: CacheKeyInner::Component {
                name: name.to_string(),
                version: version.canonical(),
            },
        }
    }

    /// Key for the latest-version pointer: `latest:{name}`.
    pub fn latest(name: &str) -> Self {
        Self {
            inner: CacheKeyInner::Latest {
                name: name.to_string(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match &self.inner {
            CacheKeyInner::Component { name, .. } | CacheKeyInner::Latest { name } => name,
        }
    }

    pub fn class(&self) -> CacheEntryClass {
        match self.inner {
            CacheKeyInner::Component { .. } => CacheEntryClass::Component,
            CacheKeyInner::Latest { .. } => CacheEntryClass::Latest,
        }
    }

    pub fn encode(&self) -> String {
        match &self.inner {
            CacheKeyInner::Component { name, version } => {
                format!("{COMPONENT_PREFIX}{SEPARATOR}{name}{SEPARATOR}{version}")
            }
            CacheKeyInner::Latest { name } => format!("{LATEST_PREFIX}{SEPARATOR}{name}"),
        }
    }

    /// Parse an encoded key. Returns `None` for anything `encode` never emits.
    pub fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, SEPARATOR);
        let inner = match (parts.next()?, parts.next(), parts.next()) {
            (COMPONENT_PREFIX, Some(name), Some(version)) if !name.is_empty() => {
                let version = SemanticVersion::parse(version).ok()?;
                CacheKeyInner::Component {
                    name: name.to_string(),
                    version: version.canonical(),
                }
            }
            (LATEST_PREFIX, Some(name), None) if !name.is_empty() => CacheKeyInner::Latest {
                name: name.to_string(),
            },
            _ => return None,
        };
        Some(Self { inner })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        let v = SemanticVersion::parse("1.2.3-rc.1+build.7").unwrap();
        assert_eq!(CacheKey::component("vpc", &v).encode(), "component:vpc:1.2.3-rc.1");
        assert_eq!(CacheKey::latest("vpc").encode(), "latest:vpc");
    }

    #[test]
    fn test_build_metadata_shares_key() {
        let a = SemanticVersion::parse("1.0.0+a").unwrap();
        let b = SemanticVersion::parse("1.0.0+b").unwrap();
        assert_eq!(CacheKey::component("x", &a), CacheKey::component("x", &b));
    }

    #[test]
    fn test_decode() {
        let key = CacheKey::decode("component:vpc:2.0.0").unwrap();
        assert_eq!(key.name(), "vpc");
        assert_eq!(key.class(), CacheEntryClass::Component);

        let latest = CacheKey::decode("latest:vpc").unwrap();
        assert_eq!(latest, CacheKey::latest("vpc"));
        assert_eq!(latest.class(), CacheEntryClass::Latest);

        assert!(CacheKey::decode("latest:").is_none());
        assert!(CacheKey::decode("component:vpc").is_none());
        assert!(CacheKey::decode("component:vpc:not-a-version").is_none());
        assert!(CacheKey::decode("other:vpc").is_none());
    }
}
