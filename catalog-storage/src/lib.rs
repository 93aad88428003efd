//! Catalog Storage - Versioned Component Catalog Store
//!
//! Implements the catalog store on top of `catalog-core`:
//!
//! - [`backend`]: the backing-store contract, in-memory and LMDB backends,
//!   and the [`CatalogTable`] adapter that owns item layout and error
//!   translation
//! - [`cache`]: the best-effort read-through cache
//! - [`store`]: the [`CatalogStore`] façade
//! - [`open_catalog_store`]: builds a store from a [`catalog_core::StoreConfig`]

pub mod backend;
pub mod cache;
pub mod dependency;
pub mod factory;
mod pagination;
pub mod store;
pub mod telemetry;
pub mod validator;

pub use backend::{
    BackendError, BackendOp, BackingStore, CatalogTable, InMemoryBackend, Item, ItemKey,
    LmdbBackend, LmdbBackendError, PutCondition, ScanDirection, ScanOutput, ScanRequest,
};
pub use cache::{
    CacheEntryClass, CacheKey, CacheStats, ComponentCache, InMemoryCache, LmdbCache,
    LmdbCacheError, NoopCache,
};
pub use dependency::{collect_dependencies, LatestResolver};
pub use factory::open_catalog_store;
pub use store::{CatalogStore, DefaultCatalogStore};
pub use telemetry::init_tracing;
pub use validator::{validate_definition, ComponentValidator, StructuralValidator};
