//! Cache façade trait and statistics.
//!
//! The cache is an accelerator, never a source of truth. A miss and a
//! broken cache look the same to readers: `get` returns `None`.

use std::time::Duration;

use async_trait::async_trait;
use catalog_core::CatalogResult;

use super::key::CacheKey;

/// Key-value cache with per-entry TTL.
///
/// Implementations must be safe for concurrent use. Values are opaque
/// bytes; the store owns serialization.
#[async_trait]
pub trait ComponentCache: Send + Sync {
    /// Look up a live entry. Misses, expired entries and backend failures
    /// all return `None`.
    async fn get(&self, key: &CacheKey) -> Option<Vec<u8>>;

    /// Insert or replace an entry that expires after `ttl`.
    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CatalogResult<()>;

    /// Remove an entry. Removing an absent key succeeds.
    async fn delete(&self, key: &CacheKey) -> CatalogResult<()>;

    async fn exists(&self, key: &CacheKey) -> bool;

    async fn stats(&self) -> CacheStats;

    /// Cheap liveness probe used by health checks.
    async fn ping(&self) -> CatalogResult<()> {
        Ok(())
    }

    /// Short backend name for logs and health reports.
    fn kind(&self) -> &'static str;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of evictions due to capacity or expiry.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
