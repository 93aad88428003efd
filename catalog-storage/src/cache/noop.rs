//! Cache that stores nothing. Every read goes to the backing store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::CatalogResult;

use super::key::CacheKey;
use super::traits::{CacheStats, ComponentCache};

#[derive(Debug, Default)]
pub struct NoopCache {
    misses: AtomicU64,
}

impl NoopCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComponentCache for NoopCache {
    async fn get(&self, _key: &CacheKey) -> Option<Vec<u8>> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn set(&self, _key: &CacheKey, _value: Vec<u8>, _ttl: Duration) -> CatalogResult<()> {
        Ok(())
    }

    async fn delete(&self, _key: &CacheKey) -> CatalogResult<()> {
        Ok(())
    }

    async fn exists(&self, _key: &CacheKey) -> bool {
        false
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            misses: self.misses.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }

    fn kind(&self) -> &'static str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_never_hits() {
        let cache = NoopCache::new();
        let key = CacheKey::latest("vpc");
        cache.set(&key, vec![1], Duration::from_secs(60)).await.unwrap();
        assert!(cache.get(&key).await.is_none());
        assert!(!cache.exists(&key).await);
        assert_eq!(cache.stats().await.misses, 1);
    }
}
