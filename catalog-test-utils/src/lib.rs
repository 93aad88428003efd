//! Catalog Test Utilities
//!
//! Shared test infrastructure for the catalog workspace:
//! - Proptest generators for versions, names and definitions
//! - Fixtures for common definitions and a ready in-memory store
//! - Custom assertions over the catalog error taxonomy

pub use catalog_core::{
    CatalogError, CatalogResult, ComponentDefinition, ComponentRef, DependencySpec, ErrorKind,
    Maturity, SemanticVersion, StorageError, Timestamp, ValidationError,
};
pub use catalog_storage::{CatalogStore, DefaultCatalogStore, InMemoryBackend, InMemoryCache};

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for catalog types.

    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    /// A release or pre-release version. Build metadata is left off so the
    /// generated value round-trips through storage unchanged.
    pub fn arb_semantic_version() -> impl Strategy<Value = SemanticVersion> {
        let pre = prop_oneof![
            3 => Just(None),
            1 => prop_oneof![
                Just("alpha".to_string()),
                Just("beta".to_string()),
                (0u64..20).prop_map(|n| format!("rc.{n}")),
            ]
            .prop_map(Some),
        ];
        (0u64..20, 0u64..20, 0u64..50, pre).prop_map(|(major, minor, patch, pre)| {
            let version = SemanticVersion::new(major, minor, patch);
            match pre {
                Some(pre) => version.with_pre_release(pre),
                None => version,
            }
        })
    }

    /// A valid DNS-label component name.
    pub fn arb_component_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,20}[a-z0-9]"
    }

    pub fn arb_maturity() -> impl Strategy<Value = Maturity> {
        prop_oneof![
            Just(Maturity::Alpha),
            Just(Maturity::Beta),
            Just(Maturity::Stable),
            Just(Maturity::Deprecated),
        ]
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// A definition that passes `validate()` and the structural validator.
    pub fn arb_component_definition() -> impl Strategy<Value = ComponentDefinition> {
        (
            arb_component_name(),
            arb_semantic_version(),
            prop_oneof![Just("aws"), Just("gcp"), Just("azure")],
            prop_oneof![Just("networking"), Just("compute"), Just("storage")],
            arb_maturity(),
            prop::sample::subsequence(vec!["terraform", "pulumi", "crossplane"], 1..=3),
            arb_timestamp(),
        )
            .prop_map(|(name, version, provider, category, maturity, engines, created_at)| {
                let mut definition = ComponentDefinition::new(name.clone(), version.to_string())
                    .with_provider(provider)
                    .with_category(category)
                    .with_maturity(maturity);
                for engine in engines {
                    definition =
                        definition.with_engine(engine, serde_json::json!({ "module": name }));
                }
                definition.metadata.created_at = created_at;
                definition.metadata.updated_at = created_at;
                definition
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built definitions and stores.

    use super::*;
    use catalog_core::StoreConfig;
    use std::sync::Arc;

    /// A minimal valid definition deployable by terraform.
    pub fn component(name: &str, version: &str) -> ComponentDefinition {
        ComponentDefinition::new(name, version)
            .with_provider("aws")
            .with_category("networking")
            .with_description(format!("Test component {name}"))
            .with_engine("terraform", serde_json::json!({ "module": name }))
    }

    /// `component` plus one `component`-typed dependency per entry of `deps`.
    pub fn component_with_deps(name: &str, version: &str, deps: &[&str]) -> ComponentDefinition {
        deps.iter().fold(component(name, version), |def, dep| {
            def.with_dependency(DependencySpec::new(*dep, "component"))
        })
    }

    /// In-memory backend and cache with default limits.
    pub fn in_memory_store() -> Arc<dyn CatalogStore> {
        in_memory_store_with(StoreConfig::in_memory())
    }

    pub fn in_memory_store_with(config: StoreConfig) -> Arc<dyn CatalogStore> {
        let backend = Arc::new(InMemoryBackend::with_limits(
            config.batch_get_limit,
            config.batch_write_limit,
        ));
        let cache = Arc::new(InMemoryCache::new(config.cache.max_entries));
        Arc::new(DefaultCatalogStore::new(backend, cache, config))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over the catalog error taxonomy.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &CatalogResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &CatalogResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), kind, "Wrong error kind for {e}"),
            Ok(v) => panic!("Expected {kind:?} error, got Ok({v:?})"),
        }
    }

    /// Assert a NotFound error naming `name`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &CatalogResult<T>, name: &str) {
        match result {
            Err(CatalogError::Storage(StorageError::NotFound { name: n, .. })) => {
                assert_eq!(n, name, "Wrong component name in NotFound error");
            }
            other => panic!("Expected NotFound error for {name}, got: {:?}", other),
        }
    }

    /// Assert an AlreadyExists error for `name@version`.
    #[track_caller]
    pub fn assert_already_exists<T: std::fmt::Debug>(
        result: &CatalogResult<T>,
        name: &str,
        version: &str,
    ) {
        match result {
            Err(CatalogError::Storage(StorageError::AlreadyExists { name: n, version: v })) => {
                assert_eq!(n, name, "Wrong component name in AlreadyExists error");
                assert_eq!(v, version, "Wrong version in AlreadyExists error");
            }
            other => panic!(
                "Expected AlreadyExists error for {name}@{version}, got: {:?}",
                other
            ),
        }
    }

    /// Assert a validation failure that includes every error in `expected`.
    #[track_caller]
    pub fn assert_validation_failed<T: std::fmt::Debug>(
        result: &CatalogResult<T>,
        expected: &[ValidationError],
    ) {
        match result {
            Err(CatalogError::Validation(errors)) => {
                for error in expected {
                    assert!(
                        errors.contains(error),
                        "Missing violation {error:?} in {errors}"
                    );
                }
            }
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
