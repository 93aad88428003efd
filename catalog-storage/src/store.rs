//! The catalog store façade.
//!
//! [`CatalogStore`] is the whole public surface of the catalog. The default
//! implementation composes a [`CatalogTable`] (authoritative) with a
//! [`ComponentCache`] (best-effort) and a [`ComponentValidator`].
//!
//! Cache rules:
//! - Reads populate on miss. Writes never populate.
//! - Every write to a name invalidates `latest:{name}`.
//! - Exact-version entries are only invalidated by deprecation and delete.
//! - Cache failures are logged and swallowed; the backing store decides.
//!
//! Nothing here retries. Throttling surfaces as a retryable error and the
//! caller owns backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use catalog_core::{
    CatalogError, CatalogResult, ComponentDefinition, ComponentRef, HealthCheck, ListFilters,
    Page, PageRequest, SemanticVersion, StoreConfig, StoreHealth, VersionConstraint,
    VersionSummary,
};
use chrono::Utc;
use tracing::{debug, error, instrument, warn};

use crate::backend::{BackingStore, CatalogTable};
use crate::cache::{CacheEntryClass, CacheKey, CacheStats, ComponentCache};
use crate::dependency::{collect_dependencies, LatestResolver};
use crate::pagination::{decode_token, encode_token};
use crate::validator::{validate_definition, ComponentValidator, StructuralValidator};

// ============================================================================
// TRAIT
// ============================================================================

#[async_trait]
pub trait CatalogStore: Send + Sync {
    // --- Reads ---

    /// Exact `(name, version)` lookup.
    async fn get_component(&self, name: &str, version: &str) -> CatalogResult<ComponentDefinition>;

    /// Highest non-deprecated version, or the highest deprecated one when
    /// every version is deprecated.
    async fn get_latest_component(&self, name: &str) -> CatalogResult<ComponentDefinition>;

    /// One page of definitions in table order, resumable through
    /// `next_token`.
    ///
    /// `page.sort` orders the items of the returned page only. Pages are not
    /// merged, so walking every page with `SortField::Version, Desc` does not
    /// yield one globally sorted sequence.
    async fn list_components(
        &self,
        filters: &ListFilters,
        page: &PageRequest,
    ) -> CatalogResult<Page<ComponentDefinition>>;

    /// `list_components` restricted to definitions matching `query` as free text.
    async fn search_components(
        &self,
        query: &str,
        filters: &ListFilters,
        page: &PageRequest,
    ) -> CatalogResult<Page<ComponentDefinition>>;

    /// Every version of `name`, highest first. Empty when none exist.
    async fn get_version_history(&self, name: &str) -> CatalogResult<Vec<VersionSummary>>;

    /// Highest version satisfying `constraint`, preferring non-deprecated ones.
    async fn find_compatible_version(
        &self,
        name: &str,
        constraint: &str,
    ) -> CatalogResult<ComponentDefinition>;

    async fn find_dependencies(
        &self,
        name: &str,
        version: &str,
        recursive: bool,
    ) -> CatalogResult<Vec<ComponentDefinition>>;

    /// Every stored definition that declares `name` as a dependency.
    async fn find_dependents(&self, name: &str) -> CatalogResult<Vec<ComponentDefinition>>;

    /// Results follow request order; missing versions are omitted.
    async fn batch_get_components(
        &self,
        refs: &[ComponentRef],
    ) -> CatalogResult<Vec<ComponentDefinition>>;

    // --- Writes ---

    async fn create_component(&self, component: &ComponentDefinition) -> CatalogResult<()>;

    async fn upsert_component(&self, component: &ComponentDefinition) -> CatalogResult<()>;

    async fn deprecate_component(
        &self,
        name: &str,
        version: &str,
        message: Option<String>,
    ) -> CatalogResult<ComponentDefinition>;

    async fn delete_component(&self, name: &str, version: &str) -> CatalogResult<()>;

    /// Returns the number of definitions created. A validation failure
    /// carries the index of the offending definition and writes nothing.
    async fn batch_create_components(
        &self,
        components: &[ComponentDefinition],
    ) -> CatalogResult<usize>;

    // --- Operations ---

    async fn health_check(&self) -> StoreHealth;

    async fn cache_stats(&self) -> CacheStats;
}

// ============================================================================
// DEFAULT IMPLEMENTATION
// ============================================================================

pub struct DefaultCatalogStore {
    table: CatalogTable,
    cache: Arc<dyn ComponentCache>,
    validator: Arc<dyn ComponentValidator>,
    config: StoreConfig,
}

impl DefaultCatalogStore {
    pub fn new(
        backend: Arc<dyn BackingStore>,
        cache: Arc<dyn ComponentCache>,
        config: StoreConfig,
    ) -> Self {
        let table = CatalogTable::new(
            backend,
            config.request_timeout,
            config.batch_get_limit,
            config.batch_write_limit,
        );
        Self {
            table,
            cache,
            validator: Arc::new(StructuralValidator::default()),
            config,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn ComponentValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Cache helpers
    // ------------------------------------------------------------------------

    async fn cached(&self, key: &CacheKey) -> Option<ComponentDefinition> {
        let bytes = self.cache.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(definition) => Some(definition),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                self.invalidate(key).await;
                None
            }
        }
    }

    async fn populate(&self, key: &CacheKey, definition: &ComponentDefinition) {
        let ttl = match key.class() {
            CacheEntryClass::Component => self.config.cache.component_ttl,
            CacheEntryClass::Latest => self.config.cache.latest_ttl,
        };
        let bytes = match serde_json::to_vec(definition) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode definition for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, bytes, ttl).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    async fn invalidate(&self, key: &CacheKey) {
        if let Err(e) = self.cache.delete(key).await {
            warn!(key = %key, error = %e, "Cache invalidation failed");
        }
    }

    fn validate(&self, component: &ComponentDefinition) -> CatalogResult<()> {
        validate_definition(component, self.validator.as_ref())?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Paged scan
    // ------------------------------------------------------------------------

    /// Bounded scan rounds until the page fills, the table ends, or the round
    /// budget runs out. Each round evaluates at most the open slots, so the
    /// resume key never skips an item that would not fit.
    async fn scan_page(
        &self,
        filters: &ListFilters,
        page: &PageRequest,
        text: Option<&str>,
    ) -> CatalogResult<Page<ComponentDefinition>> {
        let page_size = self.config.effective_page_size(page.page_size);
        let mut resume = page.token.as_ref().map(decode_token).transpose()?;
        let pushdown = filters.pushdown();

        let mut items = Vec::with_capacity(page_size);
        let mut rounds = 0usize;
        loop {
            let open_slots = page_size - items.len();
            let scan = self
                .table
                .scan(pushdown.clone(), open_slots, resume.take())
                .await?;
            rounds += 1;

            items.extend(scan.definitions.into_iter().filter(|d| {
                filters.matches_post(d) && text.map_or(true, |query| d.matches_text(query))
            }));
            resume = scan.last_evaluated_key;

            if items.len() >= page_size || resume.is_none() || rounds >= self.config.max_scan_rounds {
                break;
            }
        }

        if let Some(sort) = &page.sort {
            sort.apply(&mut items);
        }
        let next_token = resume.as_ref().map(encode_token).transpose()?;
        Ok(Page { items, next_token })
    }
}

/// First non-deprecated entry of a descending list, else its first entry.
fn pick_latest(
    versions: Vec<(SemanticVersion, ComponentDefinition)>,
) -> Option<ComponentDefinition> {
    let mut fallback = None;
    for (_, definition) in versions {
        if !definition.is_deprecated() {
            return Some(definition);
        }
        if fallback.is_none() {
            fallback = Some(definition);
        }
    }
    fallback
}

#[async_trait]
impl LatestResolver for DefaultCatalogStore {
    async fn resolve_latest(&self, name: &str) -> CatalogResult<ComponentDefinition> {
        self.get_latest_component(name).await
    }
}

#[async_trait]
impl CatalogStore for DefaultCatalogStore {
    #[instrument(skip(self), fields(backend = self.table.backend_kind()))]
    async fn get_component(&self, name: &str, version: &str) -> CatalogResult<ComponentDefinition> {
        let version = SemanticVersion::parse(version)?;
        let key = CacheKey::component(name, &version);
        if let Some(definition) = self.cached(&key).await {
            return Ok(definition);
        }

        match self.table.get(name, &version).await? {
            Some(definition) => {
                self.populate(&key, &definition).await;
                Ok(definition)
            }
            None => {
                debug!(name, version = %version, "Component not found");
                Err(CatalogError::not_found(name, Some(version.canonical())))
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_latest_component(&self, name: &str) -> CatalogResult<ComponentDefinition> {
        let key = CacheKey::latest(name);
        if let Some(definition) = self.cached(&key).await {
            return Ok(definition);
        }

        let versions = self.table.versions(name).await?;
        match pick_latest(versions) {
            Some(definition) => {
                self.populate(&key, &definition).await;
                Ok(definition)
            }
            None => {
                debug!(name, "Component has no versions");
                Err(CatalogError::not_found(name, None))
            }
        }
    }

    #[instrument(skip(self, filters, page))]
    async fn list_components(
        &self,
        filters: &ListFilters,
        page: &PageRequest,
    ) -> CatalogResult<Page<ComponentDefinition>> {
        self.scan_page(filters, page, None).await
    }

    #[instrument(skip(self, filters, page))]
    async fn search_components(
        &self,
        query: &str,
        filters: &ListFilters,
        page: &PageRequest,
    ) -> CatalogResult<Page<ComponentDefinition>> {
        self.scan_page(filters, page, Some(query)).await
    }

    #[instrument(skip(self))]
    async fn get_version_history(&self, name: &str) -> CatalogResult<Vec<VersionSummary>> {
        let versions = self.table.versions(name).await?;
        Ok(versions
            .into_iter()
            .map(|(version, definition)| VersionSummary::from_definition(&definition, version))
            .collect())
    }

    #[instrument(skip(self))]
    async fn find_compatible_version(
        &self,
        name: &str,
        constraint: &str,
    ) -> CatalogResult<ComponentDefinition> {
        let constraint = VersionConstraint::parse(constraint)?;
        let versions = self.table.versions(name).await?;
        let matching = versions
            .into_iter()
            .filter(|(version, _)| constraint.matches(version))
            .collect();
        pick_latest(matching)
            .ok_or_else(|| CatalogError::not_found(name, Some(constraint.to_string())))
    }

    #[instrument(skip(self))]
    async fn find_dependencies(
        &self,
        name: &str,
        version: &str,
        recursive: bool,
    ) -> CatalogResult<Vec<ComponentDefinition>> {
        let root = self.get_component(name, version).await?;
        collect_dependencies(&root, recursive, self).await
    }

    #[instrument(skip(self))]
    async fn find_dependents(&self, name: &str) -> CatalogResult<Vec<ComponentDefinition>> {
        let round_size = self.config.max_page_size;
        let mut dependents = Vec::new();
        let mut resume = None;
        loop {
            let scan = self.table.scan(Vec::new(), round_size, resume).await?;
            dependents.extend(scan.definitions.into_iter().filter(|d| d.depends_on(name)));
            resume = scan.last_evaluated_key;
            if resume.is_none() {
                break;
            }
        }
        Ok(dependents)
    }

    #[instrument(skip(self, refs), fields(count = refs.len()))]
    async fn batch_get_components(
        &self,
        refs: &[ComponentRef],
    ) -> CatalogResult<Vec<ComponentDefinition>> {
        let mut found: HashMap<(String, String), ComponentDefinition> = HashMap::new();
        let mut misses = Vec::new();
        for r in refs {
            let identity = (r.name.clone(), r.version.canonical());
            if found.contains_key(&identity) {
                continue;
            }
            match self.cached(&CacheKey::component(&r.name, &r.version)).await {
                Some(definition) => {
                    found.insert(identity, definition);
                }
                None => misses.push((r.name.clone(), r.version.clone())),
            }
        }
        misses.sort();
        misses.dedup();

        if !misses.is_empty() {
            for definition in self.table.batch_get(&misses).await? {
                let version = definition.semantic_version()?;
                self.populate(&CacheKey::component(definition.name(), &version), &definition)
                    .await;
                found.insert((definition.name().to_string(), version.canonical()), definition);
            }
        }

        Ok(refs
            .iter()
            .filter_map(|r| found.get(&(r.name.clone(), r.version.canonical())).cloned())
            .collect())
    }

    #[instrument(skip(self, component), fields(name = %component.metadata.name, version = %component.metadata.version))]
    async fn create_component(&self, component: &ComponentDefinition) -> CatalogResult<()> {
        self.validate(component)?;
        self.table.create(component).await?;
        self.invalidate(&CacheKey::latest(component.name())).await;
        Ok(())
    }

    #[instrument(skip(self, component), fields(name = %component.metadata.name, version = %component.metadata.version))]
    async fn upsert_component(&self, component: &ComponentDefinition) -> CatalogResult<()> {
        self.validate(component)?;
        self.table.upsert(component).await?;
        self.invalidate(&CacheKey::latest(component.name())).await;
        Ok(())
    }

    #[instrument(skip(self, message))]
    async fn deprecate_component(
        &self,
        name: &str,
        version: &str,
        message: Option<String>,
    ) -> CatalogResult<ComponentDefinition> {
        let version = SemanticVersion::parse(version)?;
        let mut definition = self
            .table
            .get(name, &version)
            .await?
            .ok_or_else(|| CatalogError::not_found(name, Some(version.canonical())))?;

        definition.deprecate(Utc::now(), message)?;
        self.table.replace(&definition).await?;

        self.invalidate(&CacheKey::latest(name)).await;
        self.invalidate(&CacheKey::component(name, &version)).await;
        Ok(definition)
    }

    #[instrument(skip(self))]
    async fn delete_component(&self, name: &str, version: &str) -> CatalogResult<()> {
        let version = SemanticVersion::parse(version)?;
        self.table.delete(name, &version).await?;
        self.invalidate(&CacheKey::latest(name)).await;
        self.invalidate(&CacheKey::component(name, &version)).await;
        Ok(())
    }

    #[instrument(skip(self, components), fields(count = components.len()))]
    async fn batch_create_components(
        &self,
        components: &[ComponentDefinition],
    ) -> CatalogResult<usize> {
        for (index, component) in components.iter().enumerate() {
            validate_definition(component, self.validator.as_ref())
                .map_err(|errors| errors.in_batch(index))?;
        }

        let result = self.table.batch_create(components).await;

        let mut names: Vec<&str> = components.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        names.dedup();
        for name in names {
            self.invalidate(&CacheKey::latest(name)).await;
        }

        if let Err(e) = &result {
            error!(error = %e, "Batch create aborted");
        }
        result
    }

    async fn health_check(&self) -> StoreHealth {
        let started = Instant::now();
        let probe = self.table.probe().await;
        let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let backend = match probe {
            Ok(()) => HealthCheck::healthy("backing_store"),
            Err(e) => HealthCheck::unhealthy("backing_store", e.to_string()),
        }
        .with_response_time(elapsed_ms)
        .with_detail("kind", serde_json::json!(self.table.backend_kind()));

        let stats = self.cache.stats().await;
        let cache = match self.cache.ping().await {
            Ok(()) => HealthCheck::healthy("cache"),
            Err(e) => HealthCheck::degraded("cache", e.to_string()),
        }
        .with_detail("kind", serde_json::json!(self.cache.kind()))
        .with_detail("entries", serde_json::json!(stats.entry_count))
        .with_detail("hit_rate", serde_json::json!(stats.hit_rate()));

        StoreHealth::from_checks(backend, cache)
    }

    async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }
}

// =============================================================================
// TESTS
// =============================================================================
