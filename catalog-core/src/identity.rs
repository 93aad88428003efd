//! Identity types for catalog entries

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{SemanticVersion, ValidationError};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash for change detection on upserts.
pub type ContentHash = [u8; 32];

/// Maximum length of a component name (one DNS label).
pub const MAX_NAME_LEN: usize = 63;

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("name pattern must compile"));

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Lowercase hex rendering of [`compute_content_hash`].
pub fn content_hash_hex(content: &[u8]) -> String {
    hex::encode(compute_content_hash(content))
}

/// Check that `name` is a DNS-label-like token: lowercase alphanumerics and
/// hyphens, 1-63 characters, no leading or trailing hyphen.
pub fn validate_component_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    let invalid = |reason: &str| ValidationError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("must be at most 63 characters"));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must not start or end with a hyphen"));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(invalid("only lowercase alphanumerics and hyphens are allowed"));
    }
    Ok(())
}

/// Reference to one exact `(name, version)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    pub name: String,
    pub version: SemanticVersion,
}

impl ComponentRef {
    pub fn new(name: impl Into<String>, version: SemanticVersion) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["a", "vpc", "aws-vpc", "s3-bucket-v2", "0day"] {
            assert!(validate_component_name(name).is_ok(), "{name}");
        }
        assert!(validate_component_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(validate_component_name(""), Err(ValidationError::MissingName));
        for name in ["-vpc", "vpc-", "VPC", "aws_vpc", "aws.vpc", "a b"] {
            assert!(
                matches!(
                    validate_component_name(name),
                    Err(ValidationError::InvalidName { .. })
                ),
                "{name}"
            );
        }
        assert!(validate_component_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(compute_content_hash(b"abc"), compute_content_hash(b"abc"));
        assert_ne!(compute_content_hash(b"abc"), compute_content_hash(b"abd"));
        assert_eq!(
            content_hash_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_component_ref_display() {
        let r = ComponentRef::new("vpc", SemanticVersion::new(1, 2, 0));
        assert_eq!(r.to_string(), "vpc@1.2.0");
    }
}
