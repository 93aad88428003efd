//! Process-local TTL cache.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{CatalogError, CatalogResult, StorageError};
use tokio::time::Instant;

use super::key::CacheKey;
use super::traits::{CacheStats, ComponentCache};

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// In-memory cache bounded by entry count.
///
/// Expired entries are dropped lazily on access and eagerly when the cache
/// is full. When still full, the entry closest to expiry is evicted.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    counters: RwLock<Counters>,
    max_entries: usize,
}

impl InMemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            counters: RwLock::new(Counters::default()),
            max_entries: max_entries.max(1),
        }
    }

    fn record_hit(&self) {
        if let Ok(mut counters) = self.counters.write() {
            counters.hits += 1;
        }
    }

    fn record_miss(&self) {
        if let Ok(mut counters) = self.counters.write() {
            counters.misses += 1;
        }
    }

    fn record_evictions(&self, count: u64) {
        if count == 0 {
            return;
        }
        if let Ok(mut counters) = self.counters.write() {
            counters.evictions += count;
        }
    }

    fn lock_error(operation: &str) -> CatalogError {
        StorageError::Unavailable {
            operation: operation.to_string(),
            reason: "cache lock poisoned".to_string(),
        }
        .into()
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(catalog_core::DEFAULT_CACHE_MAX_ENTRIES)
    }
}

#[async_trait]
impl ComponentCache for InMemoryCache {
    async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let now = Instant::now();
        let lookup = match self.entries.read() {
            Ok(entries) => entries.get(key).map(|e| (e.expires_at > now, e.value.clone())),
            Err(_) => None,
        };

        match lookup {
            Some((true, value)) => {
                self.record_hit();
                Some(value)
            }
            Some((false, _)) => {
                if let Ok(mut entries) = self.entries.write() {
                    if entries.get(key).is_some_and(|e| e.expires_at <= now) {
                        entries.remove(key);
                        self.record_evictions(1);
                    }
                }
                self.record_miss();
                None
            }
            None => {
                self.record_miss();
                None
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CatalogResult<()> {
        let now = Instant::now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| Self::lock_error("cache.set"))?;

        let mut evicted = 0u64;
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let before = entries.len();
            entries.retain(|_, e| e.expires_at > now);
            evicted += (before - entries.len()) as u64;

            if entries.len() >= self.max_entries {
                let victim = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(victim) = victim {
                    entries.remove(&victim);
                    evicted += 1;
                }
            }
        }

        entries.insert(
            key.clone(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        drop(entries);

        self.record_evictions(evicted);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CatalogResult<()> {
        self.entries
            .write()
            .map_err(|_| Self::lock_error("cache.delete"))?
            .remove(key);
        Ok(())
    }

    async fn exists(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.get(key).is_some_and(|e| e.expires_at > now))
            .unwrap_or(false)
    }

    async fn stats(&self) -> CacheStats {
        let entry_count = self.entries.read().map(|e| e.len() as u64).unwrap_or(0);
        self.counters
            .read()
            .map(|c| CacheStats {
                hits: c.hits,
                misses: c.misses,
                entry_count,
                evictions: c.evictions,
            })
            .unwrap_or_default()
    }

    async fn ping(&self) -> CatalogResult<()> {
        self.entries
            .read()
            .map(|_| ())
            .map_err(|_| Self::lock_error("cache.ping"))
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
