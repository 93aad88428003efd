//! Configuration types

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CatalogError, CatalogResult, ConfigError};

pub const DEFAULT_COMPONENT_TTL_SECS: u64 = 300;
pub const DEFAULT_LATEST_TTL_SECS: u64 = 30;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_BATCH_GET_LIMIT: usize = 100;
pub const DEFAULT_BATCH_WRITE_LIMIT: usize = 25;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_MAX_SCAN_ROUNDS: usize = 8;
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 1024;

/// Which backing store holds the authoritative records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Process-local map. Contents are lost on drop.
    #[default]
    Memory,
    Lmdb { path: PathBuf, max_size_mb: usize },
}

/// Cache implementation in front of the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheKind {
    #[default]
    Memory,
    Lmdb { path: PathBuf, max_size_mb: usize },
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub kind: CacheKind,
    /// TTL for exact `(name, version)` entries, which never change.
    pub component_ttl: Duration,
    /// TTL for latest-version pointers; new versions can appear at any time.
    pub latest_ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            kind: CacheKind::Memory,
            component_ttl: Duration::from_secs(DEFAULT_COMPONENT_TTL_SECS),
            latest_ttl: Duration::from_secs(DEFAULT_LATEST_TTL_SECS),
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl CacheSettings {
    pub fn disabled() -> Self {
        Self {
            kind: CacheKind::Disabled,
            ..Self::default()
        }
    }
}

/// Settings for a catalog store instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub cache: CacheSettings,
    /// Items per batch-get round trip.
    pub batch_get_limit: usize,
    /// Items per batch-write round trip.
    pub batch_write_limit: usize,
    /// Bound on every backing-store round trip.
    pub request_timeout: Duration,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Scan calls a single listing may issue while filling one page.
    pub max_scan_rounds: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Memory,
            cache: CacheSettings::default(),
            batch_get_limit: DEFAULT_BATCH_GET_LIMIT,
            batch_write_limit: DEFAULT_BATCH_WRITE_LIMIT,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            max_scan_rounds: DEFAULT_MAX_SCAN_ROUNDS,
        }
    }
}

impl StoreConfig {
    /// In-memory backend and in-memory cache with default limits.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn lmdb(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Lmdb {
                path: path.into(),
                max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
            },
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_cache(mut self, cache: CacheSettings) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cache_kind(mut self, kind: CacheKind) -> Self {
        self.cache.kind = kind;
        self
    }

    pub fn without_cache(self) -> Self {
        self.with_cache_kind(CacheKind::Disabled)
    }

    pub fn with_batch_limits(mut self, get: usize, write: usize) -> Self {
        self.batch_get_limit = get;
        self.batch_write_limit = write;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_page_sizes(mut self, default_size: usize, max_size: usize) -> Self {
        self.default_page_size = default_size;
        self.max_page_size = max_size;
        self
    }

    pub fn with_max_scan_rounds(mut self, rounds: usize) -> Self {
        self.max_scan_rounds = rounds;
        self
    }

    /// Page size to use for a request, clamped to `max_page_size`.
    pub fn effective_page_size(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(0) | None => self.default_page_size,
            Some(n) => n.min(self.max_page_size),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - batch limits, page sizes and scan rounds are non-zero
    /// - default_page_size <= max_page_size
    /// - request_timeout and cache TTLs are positive
    /// - latest_ttl <= component_ttl
    /// - an LMDB cache never shares the backend's directory
    pub fn validate(&self) -> CatalogResult<()> {
        let positive = [
            ("batch_get_limit", self.batch_get_limit),
            ("batch_write_limit", self.batch_write_limit),
            ("default_page_size", self.default_page_size),
            ("max_page_size", self.max_page_size),
            ("max_scan_rounds", self.max_scan_rounds),
            ("cache.max_entries", self.cache.max_entries),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, value.to_string(), "must be greater than 0"));
            }
        }

        if self.default_page_size > self.max_page_size {
            return Err(invalid(
                "default_page_size",
                self.default_page_size.to_string(),
                "must not exceed max_page_size",
            ));
        }

        let durations = [
            ("request_timeout", self.request_timeout),
            ("cache.component_ttl", self.cache.component_ttl),
            ("cache.latest_ttl", self.cache.latest_ttl),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(invalid(field, format!("{:?}", value), "must be positive"));
            }
        }

        if self.cache.latest_ttl > self.cache.component_ttl {
            return Err(invalid(
                "cache.latest_ttl",
                format!("{:?}", self.cache.latest_ttl),
                "must not exceed cache.component_ttl",
            ));
        }

        if let BackendConfig::Lmdb { path, max_size_mb } = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(CatalogError::Config(ConfigError::MissingRequired {
                    field: "backend.path".to_string(),
                }));
            }
            if *max_size_mb == 0 {
                return Err(invalid("backend.max_size_mb", "0".to_string(), "must be greater than 0"));
            }
        }

        if let CacheKind::Lmdb { path, max_size_mb } = &self.cache.kind {
            if path.as_os_str().is_empty() {
                return Err(CatalogError::Config(ConfigError::MissingRequired {
                    field: "cache.kind.path".to_string(),
                }));
            }
            if *max_size_mb == 0 {
                return Err(invalid("cache.kind.max_size_mb", "0".to_string(), "must be greater than 0"));
            }
            if let BackendConfig::Lmdb { path: backend_path, .. } = &self.backend {
                if backend_path == path {
                    return Err(CatalogError::Config(ConfigError::IncompatibleOptions {
                        option_a: format!("backend.path={}", backend_path.display()),
                        option_b: format!("cache.kind.path={}", path.display()),
                    }));
                }
            }
        }

        Ok(())
    }

    /// Create a StoreConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `CATALOG_BACKEND`: `memory` or `lmdb` (default: memory)
    /// - `CATALOG_LMDB_PATH`: backend directory, required for `lmdb`
    /// - `CATALOG_LMDB_MAX_SIZE_MB`: backend map size (default: 1024)
    /// - `CATALOG_CACHE`: `memory`, `lmdb` or `disabled` (default: memory)
    /// - `CATALOG_CACHE_PATH`: cache directory, required for an `lmdb` cache
    /// - `CATALOG_CACHE_COMPONENT_TTL_SECS`: exact-version TTL (default: 300)
    /// - `CATALOG_CACHE_LATEST_TTL_SECS`: latest-pointer TTL (default: 30)
    /// - `CATALOG_CACHE_MAX_ENTRIES`: in-memory cache capacity (default: 10000)
    /// - `CATALOG_BATCH_GET_LIMIT` / `CATALOG_BATCH_WRITE_LIMIT` (default: 100 / 25)
    /// - `CATALOG_REQUEST_TIMEOUT_MS`: per round trip (default: 5000)
    /// - `CATALOG_DEFAULT_PAGE_SIZE` / `CATALOG_MAX_PAGE_SIZE` (default: 20 / 100)
    /// - `CATALOG_MAX_SCAN_ROUNDS` (default: 8)
    ///
    /// Unknown backend or cache names are configuration errors. The result
    /// is not validated; call [`StoreConfig::validate`].
    pub fn from_env() -> CatalogResult<Self> {
        let backend = match env_string("CATALOG_BACKEND").as_deref() {
            None | Some("memory") => BackendConfig::Memory,
            Some("lmdb") => BackendConfig::Lmdb {
                path: required_path("CATALOG_LMDB_PATH")?,
                max_size_mb: env_parse("CATALOG_LMDB_MAX_SIZE_MB", DEFAULT_LMDB_MAX_SIZE_MB),
            },
            Some(other) => {
                return Err(invalid("CATALOG_BACKEND", other.to_string(), "expected memory or lmdb"))
            }
        };

        let kind = match env_string("CATALOG_CACHE").as_deref() {
            None | Some("memory") => CacheKind::Memory,
            Some("disabled") | Some("none") => CacheKind::Disabled,
            Some("lmdb") => CacheKind::Lmdb {
                path: required_path("CATALOG_CACHE_PATH")?,
                max_size_mb: env_parse("CATALOG_CACHE_MAX_SIZE_MB", DEFAULT_LMDB_MAX_SIZE_MB),
            },
            Some(other) => {
                return Err(invalid(
                    "CATALOG_CACHE",
                    other.to_string(),
                    "expected memory, lmdb or disabled",
                ))
            }
        };

        Ok(Self {
            backend,
            cache: CacheSettings {
                kind,
                component_ttl: Duration::from_secs(env_parse(
                    "CATALOG_CACHE_COMPONENT_TTL_SECS",
                    DEFAULT_COMPONENT_TTL_SECS,
                )),
                latest_ttl: Duration::from_secs(env_parse(
                    "CATALOG_CACHE_LATEST_TTL_SECS",
                    DEFAULT_LATEST_TTL_SECS,
                )),
                max_entries: env_parse("CATALOG_CACHE_MAX_ENTRIES", DEFAULT_CACHE_MAX_ENTRIES),
            },
            batch_get_limit: env_parse("CATALOG_BATCH_GET_LIMIT", DEFAULT_BATCH_GET_LIMIT),
            batch_write_limit: env_parse("CATALOG_BATCH_WRITE_LIMIT", DEFAULT_BATCH_WRITE_LIMIT),
            request_timeout: Duration::from_millis(env_parse(
                "CATALOG_REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )),
            default_page_size: env_parse("CATALOG_DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            max_page_size: env_parse("CATALOG_MAX_PAGE_SIZE", DEFAULT_MAX_PAGE_SIZE),
            max_scan_rounds: env_parse("CATALOG_MAX_SCAN_ROUNDS", DEFAULT_MAX_SCAN_ROUNDS),
        })
    }
}

fn invalid(field: &str, value: String, reason: &str) -> CatalogError {
    CatalogError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn required_path(key: &str) -> CatalogResult<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| {
            CatalogError::Config(ConfigError::MissingRequired {
                field: key.to_string(),
            })
        })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_write_limit, DEFAULT_BATCH_WRITE_LIMIT);
        assert_eq!(config.cache.component_ttl, Duration::from_secs(300));
        assert_eq!(config.cache.latest_ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let config = StoreConfig::default().with_batch_limits(0, 25);
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
        assert!(err.to_string().contains("batch_get_limit"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = StoreConfig::default().with_request_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_size_above_max_rejected() {
        let config = StoreConfig::default().with_page_sizes(50, 10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_latest_ttl_must_not_exceed_component_ttl() {
        let mut cache = CacheSettings::default();
        cache.latest_ttl = Duration::from_secs(600);
        let config = StoreConfig::default().with_cache(cache);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.latest_ttl"));
    }

    #[test]
    fn test_cache_and_backend_share_path_rejected() {
        let config = StoreConfig::lmdb("/var/lib/catalog").with_cache_kind(CacheKind::Lmdb {
            path: PathBuf::from("/var/lib/catalog"),
            max_size_mb: 64,
        });
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Config(ConfigError::IncompatibleOptions { .. })
        ));
    }

    #[test]
    fn test_effective_page_size() {
        let config = StoreConfig::default();
        assert_eq!(config.effective_page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(config.effective_page_size(Some(0)), DEFAULT_PAGE_SIZE);
        assert_eq!(config.effective_page_size(Some(7)), 7);
        assert_eq!(config.effective_page_size(Some(10_000)), DEFAULT_MAX_PAGE_SIZE);
    }

    #[test]
    fn test_from_env_defaults() {
        // Without environment variables set, should use defaults
        let config = StoreConfig::from_env().unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);
        assert_eq!(config.cache.kind, CacheKind::Memory);
        assert_eq!(config.batch_get_limit, DEFAULT_BATCH_GET_LIMIT);
        assert_eq!(
            config.request_timeout,
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)
        );
    }

    #[test]
    fn test_serde_backend_tag() {
        let json = serde_json::to_value(BackendConfig::Lmdb {
            path: PathBuf::from("/tmp/x"),
            max_size_mb: 8,
        })
        .unwrap();
        assert_eq!(json["type"], "lmdb");
    }
}
