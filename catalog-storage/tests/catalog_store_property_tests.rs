//! Property-Based Tests for the Catalog Store over Configured Backends
//!
//! Drives stores built by `open_catalog_store` through the shared fixtures,
//! generators and assertions, against both the in-memory and the LMDB
//! backends.
//!
//! - Every definition appears exactly once across a full paged listing.
//! - "Latest" is the highest stored version.
//! - Create, duplicate create, deprecate and delete keep the error taxonomy.

use std::collections::BTreeSet;
use std::sync::Arc;

use catalog_core::{CacheKind, ErrorKind, ListFilters, PageRequest, StoreConfig};
use catalog_storage::{open_catalog_store, CatalogStore};
use catalog_test_utils::{assertions, fixtures, generators, CatalogError, CatalogResult};
use proptest::prelude::*;
use tempfile::TempDir;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build")
        .block_on(future)
}

/// LMDB table and LMDB cache under one temp dir. The dir must outlive the store.
fn lmdb_store(page_rounds: usize) -> (Arc<dyn CatalogStore>, TempDir) {
    let dir = TempDir::new().expect("TempDir creation should succeed");
    let config = StoreConfig::lmdb(dir.path().join("table"))
        .with_cache_kind(CacheKind::Lmdb {
            path: dir.path().join("cache"),
            max_size_mb: 10,
        })
        .with_max_scan_rounds(page_rounds);
    let store = open_catalog_store(&config).expect("store should open");
    (store, dir)
}

async fn list_all(store: &dyn CatalogStore, page_size: usize) -> CatalogResult<Vec<String>> {
    let mut seen = Vec::new();
    let mut request = PageRequest::first(page_size);
    loop {
        let page = store.list_components(&ListFilters::new(), &request).await?;
        assert!(page.items.len() <= page_size, "page overfilled");
        seen.extend(page.items.into_iter().map(|d| d.metadata.name));
        match page.next_token {
            Some(token) => request = request.next(token),
            None => return Ok(seen),
        }
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test]
async fn test_lmdb_store_lifecycle() {
    let (store, _dir) = lmdb_store(8);

    let v1 = fixtures::component("aws-vpc", "1.0.0");
    let v2 = fixtures::component("aws-vpc", "1.1.0");
    assertions::assert_ok(&store.create_component(&v1).await);
    assertions::assert_ok(&store.create_component(&v2).await);
    assertions::assert_already_exists(&store.create_component(&v1).await, "aws-vpc", "1.0.0");
    assertions::assert_not_found(&store.get_component("aws-vpc", "2.0.0").await, "aws-vpc");

    let latest = store.get_latest_component("aws-vpc").await.unwrap();
    assert_eq!(latest.metadata.version, "1.1.0");

    store
        .deprecate_component("aws-vpc", "1.1.0", Some("use 1.0.0".into()))
        .await
        .unwrap();
    let latest = store.get_latest_component("aws-vpc").await.unwrap();
    assert_eq!(latest.metadata.version, "1.0.0");

    store.delete_component("aws-vpc", "1.0.0").await.unwrap();
    assertions::assert_not_found(&store.delete_component("aws-vpc", "1.0.0").await, "aws-vpc");
    assertions::assert_kind(&store.get_component("aws-vpc", "not-a-version").await, ErrorKind::ValidationFailed);
}

#[tokio::test]
async fn test_dependencies_across_backends() {
    let (lmdb, _dir) = lmdb_store(8);
    for store in [fixtures::in_memory_store(), lmdb] {
        store
            .create_component(&fixtures::component_with_deps("app", "1.0.0", &["db"]))
            .await
            .unwrap();
        store
            .create_component(&fixtures::component_with_deps("db", "1.0.0", &["app"]))
            .await
            .unwrap();

        let deps = store.find_dependencies("app", "1.0.0", true).await.unwrap();
        let names: Vec<_> = deps.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["db"]);

        let dependents = store.find_dependents("db").await.unwrap();
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].name(), "app");
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Paging an LMDB-backed catalog visits every definition exactly once.
    #[test]
    fn prop_lmdb_pages_cover_catalog_exactly_once(
        names in prop::collection::btree_set(generators::arb_component_name(), 1..30),
        page_size in 1usize..6,
    ) {
        let (store, _dir) = lmdb_store(1);
        let seen = block_on(async {
            for name in &names {
                store.create_component(&fixtures::component(name, "1.0.0")).await?;
            }
            list_all(store.as_ref(), page_size).await
        });
        let seen = seen.map_err(|e: CatalogError| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(seen.len(), names.len());
        prop_assert_eq!(seen.into_iter().collect::<BTreeSet<_>>(), names);
    }

    /// The LMDB partition query returns the highest version as latest.
    #[test]
    fn prop_lmdb_latest_is_highest_version(
        versions in prop::collection::btree_set(generators::arb_semantic_version(), 1..10)
    ) {
        let (store, _dir) = lmdb_store(8);
        let latest = block_on(async {
            // A neighbouring name sharing the prefix must not leak into the query.
            store.create_component(&fixtures::component("x-extra", "99.0.0")).await?;
            for v in &versions {
                store.create_component(&fixtures::component("x", &v.to_string())).await?;
            }
            store.get_latest_component("x").await
        });
        let expected = versions.iter().max().map(|v| v.to_string());
        prop_assert_eq!(latest.ok().map(|d| d.metadata.version), expected);
    }

    /// Created definitions read back unchanged through a fresh LMDB store.
    #[test]
    fn prop_lmdb_create_then_get_roundtrips(def in generators::arb_component_definition()) {
        let (store, _dir) = lmdb_store(8);
        let fetched = block_on(async {
            store.create_component(&def).await?;
            store.get_component(def.name(), &def.metadata.version).await
        });
        prop_assert_eq!(fetched.ok(), Some(def));
    }
}
