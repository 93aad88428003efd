//! Catalog Core - Component Catalog Types
//!
//! Pure data types for a versioned catalog of infrastructure component
//! definitions: semantic versions and constraints, the definition model,
//! the error taxonomy, store configuration, and listing filters.
//! No I/O lives here; `catalog-storage` builds the store on top.

mod component;
mod config;
mod constraint;
mod enums;
mod error;
mod filter;
mod health;
mod identity;
mod semver;

pub use component::{
    ComponentDefinition, ComponentMetadata, ComponentSpec, ComponentStatus, DependencySpec,
    DeploymentSpec, InputSpec, InputsSpec, OutputSpec, SourceInfo, VersionSummary,
};
pub use config::{
    BackendConfig, CacheKind, CacheSettings, StoreConfig, DEFAULT_BATCH_GET_LIMIT,
    DEFAULT_BATCH_WRITE_LIMIT, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_COMPONENT_TTL_SECS,
    DEFAULT_LATEST_TTL_SECS, DEFAULT_LMDB_MAX_SIZE_MB, DEFAULT_MAX_PAGE_SIZE,
    DEFAULT_MAX_SCAN_ROUNDS, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_MS,
};
pub use constraint::{Comparator, VersionConstraint};
pub use enums::{EnumParseError, LifecycleState, Maturity, SortField, SortOrder, ValidationStatus};
pub use error::{
    CatalogError, CatalogResult, ConfigError, ErrorKind, StorageError, ValidationError,
    ValidationErrors, VersionError,
};
pub use filter::{
    FilterExpr, FilterOperator, ListFilters, Page, PageRequest, PageToken, SortSpec,
};
pub use health::{HealthCheck, HealthStatus, StoreHealth};
pub use identity::{
    compute_content_hash, content_hash_hex, validate_component_name, ComponentRef, ContentHash,
    Timestamp, MAX_NAME_LEN,
};
pub use semver::SemanticVersion;
