//! Backing-store primitives.
//!
//! The catalog talks to its authoritative store through [`BackingStore`], a
//! key-value contract shaped like a partitioned table: point operations by
//! `(partition, sort)` key, conditional puts, range queries inside one
//! partition, bounded resumable scans with attribute filters, and bounded
//! batch reads and writes.
//!
//! Backends report [`BackendError`]. Those errors never leave this crate:
//! [`CatalogTable`] translates them into the catalog error taxonomy.

pub mod adapter;
pub mod lmdb;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use catalog_core::FilterExpr;
use serde::{Deserialize, Serialize};

pub use adapter::CatalogTable;
pub use lmdb::{LmdbBackend, LmdbBackendError};
pub use memory::{BackendOp, InMemoryBackend};

/// Primary key of an item.
///
/// Items order by partition, then sort key. Scans walk that order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    #[serde(rename = "pk")]
    pub partition: String,
    #[serde(rename = "sk")]
    pub sort: String,
}

impl ItemKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

/// One stored record: indexed string attributes plus an opaque body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: ItemKey,
    pub attributes: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

/// Precondition on the existing item for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutCondition {
    #[default]
    None,
    MustNotExist,
    MustExist,
}

impl PutCondition {
    pub(crate) fn check(&self, exists: bool) -> bool {
        match self {
            PutCondition::None => true,
            PutCondition::MustNotExist => !exists,
            PutCondition::MustExist => exists,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDirection {
    #[default]
    Forward,
    Backward,
}

/// A bounded scan over the whole table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    /// All must hold for an item to be returned.
    pub filters: Vec<FilterExpr>,
    /// Items to evaluate, matching or not.
    pub limit: usize,
    /// Resume strictly after this key.
    pub exclusive_start: Option<ItemKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    pub items: Vec<Item>,
    /// Last key evaluated when items remain beyond it; `None` at the end.
    pub last_evaluated_key: Option<ItemKey>,
}

/// Errors raised by backing-store implementations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Conditional check failed for {}/{}", .0.partition, .0.sort)]
    ConditionFailed(ItemKey),

    #[error("Request rate exceeded")]
    Throttled,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend request timed out")]
    Timeout,

    #[error("Batch of {size} exceeds limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Corrupt item: {0}")]
    Serialization(String),
}

/// Authoritative key-value store contract.
///
/// Implementations must be safe for concurrent use, and conditional writes
/// must be atomic with respect to other writers.
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, BackendError>;

    async fn put_item(&self, item: Item, condition: PutCondition) -> Result<(), BackendError>;

    /// Returns whether an item was removed.
    async fn delete_item(&self, key: &ItemKey, condition: PutCondition) -> Result<bool, BackendError>;

    /// Items of one partition whose sort key starts with `sort_prefix`.
    async fn query(
        &self,
        partition: &str,
        sort_prefix: &str,
        direction: ScanDirection,
        limit: Option<usize>,
    ) -> Result<Vec<Item>, BackendError>;

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, BackendError>;

    /// Fetch up to `batch_get_limit()` keys. Missing keys are omitted.
    async fn batch_get(&self, keys: &[ItemKey]) -> Result<Vec<Item>, BackendError>;

    /// Write up to `batch_write_limit()` items atomically. When `condition`
    /// fails for any item, nothing from the batch is written.
    async fn batch_write(&self, items: Vec<Item>, condition: PutCondition) -> Result<(), BackendError>;

    fn batch_get_limit(&self) -> usize;

    fn batch_write_limit(&self) -> usize;

    fn kind(&self) -> &'static str;
}

/// Evaluate up to `request.limit` items from `remaining`, which the backend
/// has already positioned strictly after `request.exclusive_start`.
///
/// Items are pulled lazily: at most `limit + 1` are decoded, the extra one
/// only to learn whether the scan can continue. A corrupt item past that
/// point does not fail this round.
pub(crate) fn scan_sorted<I>(remaining: I, request: &ScanRequest) -> Result<ScanOutput, BackendError>
where
    I: Iterator<Item = Result<Item, BackendError>>,
{
    let mut remaining = remaining.peekable();
    let mut items = Vec::new();
    let mut last = None;
    let mut evaluated = 0usize;
    while evaluated < request.limit {
        let Some(item) = remaining.next() else { break };
        let item = item?;
        evaluated += 1;
        last = Some(item.key.clone());
        if request.filters.iter().all(|f| f.evaluate(&item.attributes)) {
            items.push(item);
        }
    }

    let last_evaluated_key = if remaining.peek().is_some() { last } else { None };
    Ok(ScanOutput {
        items,
        last_evaluated_key,
    })
}
