//! Catalog-shaped view over a [`BackingStore`].
//!
//! [`CatalogTable`] owns the item layout, applies the request timeout to
//! every round trip, chunks batch calls, and translates [`BackendError`]
//! into [`StorageError`]. Nothing above this module sees a backend error.
//!
//! # Item Layout
//!
//! - Partition key: `COMPONENT#{name}`
//! - Sort key: zero-padded `major.minor.patch` followed by `~` for a release
//!   or `-{pre}` for a pre-release, so a release sorts after its pre-releases
//! - Attributes: the indexed metadata fields that filters push down onto
//! - Body: the JSON-encoded definition

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use catalog_core::{
    content_hash_hex, CatalogResult, ComponentDefinition, FilterExpr, SemanticVersion,
    StorageError,
};

use super::{BackendError, BackingStore, Item, ItemKey, PutCondition, ScanDirection, ScanRequest};

const PARTITION_PREFIX: &str = "COMPONENT#";
const RELEASE_MARKER: char = '~';
const PROBE_PARTITION: &str = "HEALTH#probe";

// ============================================================================
// KEYS
// ============================================================================

pub fn partition_key(name: &str) -> String {
    format!("{PARTITION_PREFIX}{name}")
}

pub fn sort_key(version: &SemanticVersion) -> String {
    let triple = format!("{:020}.{:020}.{:020}", version.major, version.minor, version.patch);
    match &version.pre_release {
        Some(pre) => format!("{triple}-{pre}"),
        None => format!("{triple}{RELEASE_MARKER}"),
    }
}

pub fn item_key(name: &str, version: &SemanticVersion) -> ItemKey {
    ItemKey::new(partition_key(name), sort_key(version))
}

// ============================================================================
// ENCODING
// ============================================================================

fn encode_item(definition: &ComponentDefinition) -> CatalogResult<Item> {
    let version = definition.semantic_version()?;
    let body = serde_json::to_vec(definition).map_err(|e| StorageError::Unavailable {
        operation: "encode_component".to_string(),
        reason: e.to_string(),
    })?;

    let m = &definition.metadata;
    let mut attributes = BTreeMap::new();
    attributes.insert("name".to_string(), m.name.clone());
    attributes.insert("version".to_string(), version.canonical());
    attributes.insert("provider".to_string(), m.provider.clone());
    attributes.insert("category".to_string(), m.category.clone());
    if let Some(sub_category) = &m.sub_category {
        attributes.insert("sub_category".to_string(), sub_category.clone());
    }
    if let Some(resource_type) = &m.resource_type {
        attributes.insert("resource_type".to_string(), resource_type.clone());
    }
    attributes.insert("maturity".to_string(), m.maturity.as_db_str().to_string());
    attributes.insert("deprecated".to_string(), definition.is_deprecated().to_string());
    attributes.insert("content_hash".to_string(), content_hash_hex(&body));

    Ok(Item {
        key: item_key(&m.name, &version),
        attributes,
        body,
    })
}

fn decode_item(item: &Item) -> CatalogResult<ComponentDefinition> {
    serde_json::from_slice(&item.body).map_err(|e| {
        StorageError::Unavailable {
            operation: "decode_component".to_string(),
            reason: format!("{}/{}: {}", item.key.partition, item.key.sort, e),
        }
        .into()
    })
}

// ============================================================================
// TABLE
// ============================================================================

/// Result of one bounded scan round.
#[derive(Debug, Clone, Default)]
pub struct TableScan {
    pub definitions: Vec<ComponentDefinition>,
    pub last_evaluated_key: Option<ItemKey>,
}

pub struct CatalogTable {
    backend: Arc<dyn BackingStore>,
    request_timeout: Duration,
    batch_get_limit: usize,
    batch_write_limit: usize,
}

impl CatalogTable {
    /// Chunk sizes never exceed what the backend itself accepts.
    pub fn new(
        backend: Arc<dyn BackingStore>,
        request_timeout: Duration,
        batch_get_limit: usize,
        batch_write_limit: usize,
    ) -> Self {
        let batch_get_limit = batch_get_limit.min(backend.batch_get_limit()).max(1);
        let batch_write_limit = batch_write_limit.min(backend.batch_write_limit()).max(1);
        Self {
            backend,
            request_timeout,
            batch_get_limit,
            batch_write_limit,
        }
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn batch_get_limit(&self) -> usize {
        self.batch_get_limit
    }

    pub fn batch_write_limit(&self) -> usize {
        self.batch_write_limit
    }

    async fn call<T, F>(&self, request: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>> + Send,
    {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout),
        }
    }

    fn translate(&self, operation: &str, error: BackendError) -> StorageError {
        let operation = operation.to_string();
        match error {
            BackendError::Throttled => StorageError::Throttled { operation },
            BackendError::Timeout => StorageError::Timeout {
                operation,
                after: self.request_timeout,
            },
            BackendError::ConditionFailed(key) => StorageError::Unavailable {
                operation,
                reason: format!("unexpected conditional check failure on {}/{}", key.partition, key.sort),
            },
            BackendError::Unavailable(reason) | BackendError::Serialization(reason) => {
                StorageError::Unavailable { operation, reason }
            }
            other @ BackendError::BatchTooLarge { .. } => StorageError::Unavailable {
                operation,
                reason: other.to_string(),
            },
        }
    }

    pub async fn get(
        &self,
        name: &str,
        version: &SemanticVersion,
    ) -> CatalogResult<Option<ComponentDefinition>> {
        let key = item_key(name, version);
        let item = self
            .call(self.backend.get_item(&key))
            .await
            .map_err(|e| self.translate("get_component", e))?;
        item.as_ref().map(decode_item).transpose()
    }

    /// Conditional create; a collision is `AlreadyExists`.
    pub async fn create(&self, definition: &ComponentDefinition) -> CatalogResult<()> {
        let item = encode_item(definition)?;
        match self
            .call(self.backend.put_item(item, PutCondition::MustNotExist))
            .await
        {
            Ok(()) => Ok(()),
            Err(BackendError::ConditionFailed(_)) => Err(StorageError::AlreadyExists {
                name: definition.metadata.name.clone(),
                version: definition.metadata.version.clone(),
            }
            .into()),
            Err(e) => Err(self.translate("create_component", e).into()),
        }
    }

    pub async fn upsert(&self, definition: &ComponentDefinition) -> CatalogResult<()> {
        let item = encode_item(definition)?;
        self.call(self.backend.put_item(item, PutCondition::None))
            .await
            .map_err(|e| self.translate("upsert_component", e).into())
    }

    /// Overwrite an existing record; an absent one is `NotFound`.
    pub async fn replace(&self, definition: &ComponentDefinition) -> CatalogResult<()> {
        let item = encode_item(definition)?;
        match self
            .call(self.backend.put_item(item, PutCondition::MustExist))
            .await
        {
            Ok(()) => Ok(()),
            Err(BackendError::ConditionFailed(_)) => Err(StorageError::NotFound {
                name: definition.metadata.name.clone(),
                version: Some(definition.metadata.version.clone()),
            }
            .into()),
            Err(e) => Err(self.translate("replace_component", e).into()),
        }
    }

    pub async fn delete(&self, name: &str, version: &SemanticVersion) -> CatalogResult<()> {
        let key = item_key(name, version);
        match self
            .call(self.backend.delete_item(&key, PutCondition::MustExist))
            .await
        {
            Ok(_) => Ok(()),
            Err(BackendError::ConditionFailed(_)) => {
                Err(StorageError::NotFound {
                    name: name.to_string(),
                    version: Some(version.canonical()),
                }
                .into())
            }
            Err(e) => Err(self.translate("delete_component", e).into()),
        }
    }

    /// Every stored version of `name`, highest first.
    ///
    /// Sort keys order pre-release identifiers lexically, so the partition is
    /// re-sorted by semantic version after the query.
    pub async fn versions(
        &self,
        name: &str,
    ) -> CatalogResult<Vec<(SemanticVersion, ComponentDefinition)>> {
        let partition = partition_key(name);
        let items = self
            .call(self.backend.query(&partition, "", ScanDirection::Backward, None))
            .await
            .map_err(|e| self.translate("query_versions", e))?;

        let mut versions = Vec::with_capacity(items.len());
        for item in &items {
            let definition = decode_item(item)?;
            let version = definition.semantic_version()?;
            versions.push((version, definition));
        }
        versions.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(versions)
    }

    /// One bounded scan round. `limit` counts evaluated items.
    pub async fn scan(
        &self,
        filters: Vec<FilterExpr>,
        limit: usize,
        exclusive_start: Option<ItemKey>,
    ) -> CatalogResult<TableScan> {
        let request = ScanRequest {
            filters,
            limit,
            exclusive_start,
        };
        let output = self
            .call(self.backend.scan(request))
            .await
            .map_err(|e| self.translate("scan_components", e))?;

        let definitions = output
            .items
            .iter()
            .filter(|item| item.key.partition.starts_with(PARTITION_PREFIX))
            .map(decode_item)
            .collect::<CatalogResult<Vec<_>>>()?;
        Ok(TableScan {
            definitions,
            last_evaluated_key: output.last_evaluated_key,
        })
    }

    /// Fetch many exact versions in chunks. Missing versions are omitted;
    /// order follows the backend, not the request.
    pub async fn batch_get(
        &self,
        refs: &[(String, SemanticVersion)],
    ) -> CatalogResult<Vec<ComponentDefinition>> {
        let keys: Vec<ItemKey> = refs
            .iter()
            .map(|(name, version)| item_key(name, version))
            .collect();
        let chunks = keys.len().div_ceil(self.batch_get_limit);

        let mut definitions = Vec::with_capacity(keys.len());
        for (index, chunk) in keys.chunks(self.batch_get_limit).enumerate() {
            let items = self
                .call(self.backend.batch_get(chunk))
                .await
                .map_err(|e| StorageError::BatchChunkFailed {
                    operation: "batch_get_components".to_string(),
                    chunk: index + 1,
                    chunks,
                    committed: definitions.len(),
                    source: Box::new(self.translate("batch_get", e)),
                })?;
            for item in &items {
                definitions.push(decode_item(item)?);
            }
        }
        Ok(definitions)
    }

    /// Create many definitions, one atomic conditional batch per chunk.
    ///
    /// Chunks are issued in order and stop at the first failure. Chunks that
    /// committed before it stay committed.
    pub async fn batch_create(&self, definitions: &[ComponentDefinition]) -> CatalogResult<usize> {
        let items = definitions
            .iter()
            .map(encode_item)
            .collect::<CatalogResult<Vec<_>>>()?;
        let chunks = items.len().div_ceil(self.batch_write_limit);

        let mut committed = 0usize;
        for (index, chunk) in items.chunks(self.batch_write_limit).enumerate() {
            let result = self
                .call(self.backend.batch_write(chunk.to_vec(), PutCondition::MustNotExist))
                .await;
            if let Err(error) = result {
                let source = match error {
                    BackendError::ConditionFailed(key) => {
                        let (name, version) = chunk
                            .iter()
                            .find(|item| item.key == key)
                            .map(|item| {
                                (
                                    item.attributes.get("name").cloned().unwrap_or_default(),
                                    item.attributes.get("version").cloned().unwrap_or_default(),
                                )
                            })
                            .unwrap_or_else(|| (key.partition.clone(), key.sort.clone()));
                        StorageError::AlreadyExists { name, version }
                    }
                    other => self.translate("batch_write", other),
                };
                return Err(StorageError::BatchChunkFailed {
                    operation: "batch_create_components".to_string(),
                    chunk: index + 1,
                    chunks,
                    committed,
                    source: Box::new(source),
                }
                .into());
            }
            committed += chunk.len();
        }
        Ok(committed)
    }

    /// Round-trip a point read against a key no component can occupy.
    pub async fn probe(&self) -> CatalogResult<()> {
        let key = ItemKey::new(PROBE_PARTITION, "0");
        self.call(self.backend.get_item(&key))
            .await
            .map(|_| ())
            .map_err(|e| self.translate("health_probe", e).into())
    }
}
