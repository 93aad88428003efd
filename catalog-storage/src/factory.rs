//! Store construction from configuration.

use std::sync::Arc;

use catalog_core::{BackendConfig, CacheKind, CatalogResult, StoreConfig};

use crate::backend::{BackingStore, InMemoryBackend, LmdbBackend};
use crate::cache::{ComponentCache, InMemoryCache, LmdbCache, NoopCache};
use crate::store::{CatalogStore, DefaultCatalogStore};

/// Validate `config`, build the backend and cache it names, and compose the
/// catalog store. Invalid settings fail here, never later.
pub fn open_catalog_store(config: &StoreConfig) -> CatalogResult<Arc<dyn CatalogStore>> {
    config.validate()?;

    let backend = open_backend(config)?;
    let cache = open_cache(config)?;
    tracing::info!(
        backend = backend.kind(),
        cache = cache.kind(),
        "Catalog store opened"
    );

    Ok(Arc::new(DefaultCatalogStore::new(backend, cache, config.clone())))
}

fn open_backend(config: &StoreConfig) -> CatalogResult<Arc<dyn BackingStore>> {
    Ok(match &config.backend {
        BackendConfig::Memory => Arc::new(InMemoryBackend::with_limits(
            config.batch_get_limit,
            config.batch_write_limit,
        )),
        BackendConfig::Lmdb { path, max_size_mb } => Arc::new(
            LmdbBackend::open(path, *max_size_mb)?
                .with_limits(config.batch_get_limit, config.batch_write_limit),
        ),
    })
}

fn open_cache(config: &StoreConfig) -> CatalogResult<Arc<dyn ComponentCache>> {
    Ok(match &config.cache.kind {
        CacheKind::Memory => Arc::new(InMemoryCache::new(config.cache.max_entries)),
        CacheKind::Lmdb { path, max_size_mb } => Arc::new(LmdbCache::new(
            path,
            *max_size_mb,
            config.cache.max_entries,
        )?),
        CacheKind::Disabled => Arc::new(NoopCache::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::{ComponentDefinition, ErrorKind, HealthStatus};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = open_catalog_store(&StoreConfig::in_memory()).unwrap();
        let def = ComponentDefinition::new("vpc", "1.0.0").with_engine("terraform", json!({}));
        store.create_component(&def).await.unwrap();
        assert_eq!(store.get_latest_component("vpc").await.unwrap().name(), "vpc");
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = StoreConfig::in_memory().with_batch_limits(0, 25);
        let err = open_catalog_store(&config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }

    #[tokio::test]
    async fn test_lmdb_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::lmdb(dir.path().join("table")).with_cache_kind(CacheKind::Lmdb {
            path: dir.path().join("cache"),
            max_size_mb: 10,
        });

        {
            let store = open_catalog_store(&config).unwrap();
            let def = ComponentDefinition::new("vpc", "1.0.0").with_engine("terraform", json!({}));
            store.create_component(&def).await.unwrap();
            assert_eq!(store.health_check().await.status, HealthStatus::Healthy);
        }

        let store = open_catalog_store(&config).unwrap();
        let history = store.get_version_history("vpc").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let store = open_catalog_store(&StoreConfig::in_memory().without_cache()).unwrap();
        let def = ComponentDefinition::new("vpc", "1.0.0").with_engine("terraform", json!({}));
        store.create_component(&def).await.unwrap();
        store.get_component("vpc", "1.0.0").await.unwrap();
        store.get_component("vpc", "1.0.0").await.unwrap();
        assert_eq!(store.cache_stats().await.hits, 0);
    }
}
