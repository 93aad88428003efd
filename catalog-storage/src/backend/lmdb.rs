//! LMDB backing store.
//!
//! Persists items in a single heed database. Conditional writes check and
//! write inside one write transaction; LMDB serializes writers, so the check
//! is atomic.
//!
//! # Binary Format
//!
//! - Key: `[partition][0x00][sort]`, which sorts the same as `(partition, sort)`
//! - Value: `[attributes length: 4 bytes LE][attributes JSON][body]`

use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

use async_trait::async_trait;
use catalog_core::{
    CatalogError, StorageError, DEFAULT_BATCH_GET_LIMIT, DEFAULT_BATCH_WRITE_LIMIT,
};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};

use super::{
    scan_sorted, BackendError, BackingStore, Item, ItemKey, PutCondition, ScanDirection,
    ScanOutput, ScanRequest,
};

const KEY_SEPARATOR: u8 = 0x00;

/// Error type for opening the LMDB backend.
#[derive(Debug, thiserror::Error)]
pub enum LmdbBackendError {
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbBackendError> for CatalogError {
    fn from(e: LmdbBackendError) -> Self {
        CatalogError::Storage(StorageError::Unavailable {
            operation: "open_backend".to_string(),
            reason: e.to_string(),
        })
    }
}

pub struct LmdbBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    batch_get_limit: usize,
    batch_write_limit: usize,
}

impl LmdbBackend {
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbBackendError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbBackendError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbBackendError::DbOpen(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbBackendError::DbOpen(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbBackendError::DbOpen(e.to_string()))?;

        Ok(Self {
            env,
            db,
            batch_get_limit: DEFAULT_BATCH_GET_LIMIT,
            batch_write_limit: DEFAULT_BATCH_WRITE_LIMIT,
        })
    }

    pub fn with_limits(mut self, batch_get_limit: usize, batch_write_limit: usize) -> Self {
        self.batch_get_limit = batch_get_limit.max(1);
        self.batch_write_limit = batch_write_limit.max(1);
        self
    }

    fn read_txn(&self) -> Result<RoTxn<'_>, BackendError> {
        self.env.read_txn().map_err(txn_error)
    }

    fn load(&self, rtxn: &RoTxn<'_>, key: &ItemKey) -> Result<Option<Item>, BackendError> {
        match self.db.get(rtxn, &encode_key(key)).map_err(txn_error)? {
            Some(bytes) => decode_value(key.clone(), bytes).map(Some),
            None => Ok(None),
        }
    }
}

fn txn_error(e: heed::Error) -> BackendError {
    BackendError::Unavailable(e.to_string())
}

fn decode_entry(entry: heed::Result<(&[u8], &[u8])>) -> Result<Item, BackendError> {
    let (raw_key, raw_value) = entry.map_err(txn_error)?;
    let key = decode_key(raw_key)?;
    decode_value(key, raw_value)
}

fn encode_key(key: &ItemKey) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(key.partition.len() + 1 + key.sort.len());
    bytes.extend_from_slice(key.partition.as_bytes());
    bytes.push(KEY_SEPARATOR);
    bytes.extend_from_slice(key.sort.as_bytes());
    bytes
}

fn decode_key(bytes: &[u8]) -> Result<ItemKey, BackendError> {
    let split = bytes
        .iter()
        .position(|b| *b == KEY_SEPARATOR)
        .ok_or_else(|| BackendError::Serialization("key without separator".to_string()))?;
    let text = |raw: &[u8]| {
        String::from_utf8(raw.to_vec()).map_err(|e| BackendError::Serialization(e.to_string()))
    };
    Ok(ItemKey {
        partition: text(&bytes[..split])?,
        sort: text(&bytes[split + 1..])?,
    })
}

fn encode_value(item: &Item) -> Result<Vec<u8>, BackendError> {
    let attributes = serde_json::to_vec(&item.attributes)
        .map_err(|e| BackendError::Serialization(e.to_string()))?;
    let len = u32::try_from(attributes.len())
        .map_err(|_| BackendError::Serialization("attributes too large".to_string()))?;
    let mut bytes = Vec::with_capacity(4 + attributes.len() + item.body.len());
    bytes.extend_from_slice(&len.to_le_bytes());
    bytes.extend_from_slice(&attributes);
    bytes.extend_from_slice(&item.body);
    Ok(bytes)
}

fn decode_value(key: ItemKey, bytes: &[u8]) -> Result<Item, BackendError> {
    let corrupt = || BackendError::Serialization(format!("truncated value for {}/{}", key.partition, key.sort));
    let header: [u8; 4] = bytes
        .get(0..4)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(corrupt)?;
    let len = u32::from_le_bytes(header) as usize;
    let attributes_raw = bytes.get(4..4 + len).ok_or_else(corrupt)?;
    let attributes: BTreeMap<String, String> = serde_json::from_slice(attributes_raw)
        .map_err(|e| BackendError::Serialization(e.to_string()))?;
    Ok(Item {
        body: bytes[4 + len..].to_vec(),
        key,
        attributes,
    })
}

#[async_trait]
impl BackingStore for LmdbBackend {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, BackendError> {
        let rtxn = self.read_txn()?;
        self.load(&rtxn, key)
    }

    async fn put_item(&self, item: Item, condition: PutCondition) -> Result<(), BackendError> {
        let encoded_key = encode_key(&item.key);
        let value = encode_value(&item)?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let exists = self.db.get(&wtxn, &encoded_key).map_err(txn_error)?.is_some();
        if !condition.check(exists) {
            return Err(BackendError::ConditionFailed(item.key));
        }
        self.db.put(&mut wtxn, &encoded_key, &value).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)
    }

    async fn delete_item(&self, key: &ItemKey, condition: PutCondition) -> Result<bool, BackendError> {
        let encoded_key = encode_key(key);
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let exists = self.db.get(&wtxn, &encoded_key).map_err(txn_error)?.is_some();
        if !condition.check(exists) {
            return Err(BackendError::ConditionFailed(key.clone()));
        }
        let deleted = self.db.delete(&mut wtxn, &encoded_key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    async fn query(
        &self,
        partition: &str,
        sort_prefix: &str,
        direction: ScanDirection,
        limit: Option<usize>,
    ) -> Result<Vec<Item>, BackendError> {
        // The separator ends the partition, so "a" never matches "ab".
        let prefix = encode_key(&ItemKey::new(partition, sort_prefix));
        let limit = limit.unwrap_or(usize::MAX);
        let rtxn = self.read_txn()?;
        match direction {
            ScanDirection::Forward => self
                .db
                .prefix_iter(&rtxn, prefix.as_slice())
                .map_err(txn_error)?
                .take(limit)
                .map(decode_entry)
                .collect(),
            ScanDirection::Backward => self
                .db
                .rev_prefix_iter(&rtxn, prefix.as_slice())
                .map_err(txn_error)?
                .take(limit)
                .map(decode_entry)
                .collect(),
        }
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, BackendError> {
        let start = request.exclusive_start.as_ref().map(encode_key);
        let lower = match &start {
            Some(bytes) => Bound::Excluded(bytes.as_slice()),
            None => Bound::Unbounded,
        };
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (lower, Bound::Unbounded);

        let rtxn = self.read_txn()?;
        let remaining = self.db.range(&rtxn, &range).map_err(txn_error)?;
        scan_sorted(remaining.map(decode_entry), &request)
    }

    async fn batch_get(&self, keys: &[ItemKey]) -> Result<Vec<Item>, BackendError> {
        if keys.len() > self.batch_get_limit {
            return Err(BackendError::BatchTooLarge {
                size: keys.len(),
                limit: self.batch_get_limit,
            });
        }
        let rtxn = self.read_txn()?;
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = self.load(&rtxn, key)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn batch_write(&self, batch: Vec<Item>, condition: PutCondition) -> Result<(), BackendError> {
        if batch.len() > self.batch_write_limit {
            return Err(BackendError::BatchTooLarge {
                size: batch.len(),
                limit: self.batch_write_limit,
            });
        }

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        for item in &batch {
            let encoded_key = encode_key(&item.key);
            // Earlier writes in this transaction are visible, so repeats fail MustNotExist.
            let exists = self.db.get(&wtxn, &encoded_key).map_err(txn_error)?.is_some();
            if !condition.check(exists) {
                // Dropping the transaction aborts every write in the batch.
                return Err(BackendError::ConditionFailed(item.key.clone()));
            }
            self.db
                .put(&mut wtxn, &encoded_key, &encode_value(item)?)
                .map_err(txn_error)?;
        }
        wtxn.commit().map_err(txn_error)
    }

    fn batch_get_limit(&self) -> usize {
        self.batch_get_limit
    }

    fn batch_write_limit(&self) -> usize {
        self.batch_write_limit
    }

    fn kind(&self) -> &'static str {
        "lmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_core::FilterExpr;
    use tempfile::TempDir;

    fn create_test_backend() -> (LmdbBackend, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend = LmdbBackend::open(temp_dir.path(), 10)
            .expect("backend creation should succeed")
            .with_limits(10, 3);
        (backend, temp_dir)
    }

    fn item(pk: &str, sk: &str, provider: &str) -> Item {
        let mut attributes = BTreeMap::new();
        attributes.insert("provider".to_string(), provider.to_string());
        Item {
            key: ItemKey::new(pk, sk),
            attributes,
            body: br#"{"ok":true}"#.to_vec(),
        }
    }

    #[test]
    fn test_key_encoding_preserves_order() {
        let a = encode_key(&ItemKey::new("a", "z"));
        let ab = encode_key(&ItemKey::new("ab", "a"));
        assert!(a < ab);
        assert_eq!(decode_key(&ab).unwrap(), ItemKey::new("ab", "a"));
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (backend, _temp_dir) = create_test_backend();
        let original = item("COMPONENT#vpc", "1", "aws");
        backend
            .put_item(original.clone(), PutCondition::MustNotExist)
            .await
            .expect("put should succeed");
        let loaded = backend
            .get_item(&original.key)
            .await
            .expect("get should succeed");
        assert_eq!(loaded, Some(original));
    }

    #[tokio::test]
    async fn test_conditional_put_rejects_duplicate() {
        let (backend, _temp_dir) = create_test_backend();
        backend
            .put_item(item("p", "1", "aws"), PutCondition::MustNotExist)
            .await
            .unwrap();
        let err = backend
            .put_item(item("p", "1", "gcp"), PutCondition::MustNotExist)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ConditionFailed(_)));

        let stored = backend.get_item(&ItemKey::new("p", "1")).await.unwrap().unwrap();
        assert_eq!(stored.attributes["provider"], "aws");
    }

    #[tokio::test]
    async fn test_query_stays_in_partition() {
        let (backend, _temp_dir) = create_test_backend();
        for (pk, sk) in [("a", "1"), ("a", "2"), ("ab", "1")] {
            backend.put_item(item(pk, sk, "aws"), PutCondition::None).await.unwrap();
        }
        let items = backend
            .query("a", "", ScanDirection::Backward, None)
            .await
            .unwrap();
        let keys: Vec<_> = items.iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec![ItemKey::new("a", "2"), ItemKey::new("a", "1")]);
    }

    #[tokio::test]
    async fn test_scan_with_filter_and_resume() {
        let (backend, _temp_dir) = create_test_backend();
        for (pk, provider) in [("a", "aws"), ("b", "gcp"), ("c", "aws"), ("d", "aws")] {
            backend.put_item(item(pk, "1", provider), PutCondition::None).await.unwrap();
        }
        let first = backend
            .scan(ScanRequest {
                filters: vec![FilterExpr::eq("provider", "aws")],
                limit: 2,
                exclusive_start: None,
            })
            .await
            .unwrap();
        assert_eq!(first.items.len(), 1);
        let resume = first.last_evaluated_key.clone();
        assert_eq!(resume, Some(ItemKey::new("b", "1")));

        let second = backend
            .scan(ScanRequest {
                filters: vec![FilterExpr::eq("provider", "aws")],
                limit: 2,
                exclusive_start: resume,
            })
            .await
            .unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_scan_reads_only_the_requested_window() {
        let (backend, _temp_dir) = create_test_backend();
        for pk in ["a", "b", "c"] {
            backend.put_item(item(pk, "1", "aws"), PutCondition::None).await.unwrap();
        }
        // Undecodable row at the end of the table.
        let mut wtxn = backend.env.write_txn().unwrap();
        backend.db.put(&mut wtxn, b"z\x001", b"\x01").unwrap();
        wtxn.commit().unwrap();

        let page = backend
            .scan(ScanRequest {
                filters: vec![],
                limit: 1,
                exclusive_start: Some(ItemKey::new("a", "1")),
            })
            .await
            .expect("rows past the window are not decoded");
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].key, ItemKey::new("b", "1"));
        assert_eq!(page.last_evaluated_key, Some(ItemKey::new("b", "1")));

        let err = backend
            .scan(ScanRequest {
                filters: vec![],
                limit: 5,
                exclusive_start: page.last_evaluated_key,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_query_forward_with_limit() {
        let (backend, _temp_dir) = create_test_backend();
        for sk in ["x1", "x2", "y1"] {
            backend.put_item(item("a", sk, "aws"), PutCondition::None).await.unwrap();
        }
        let items = backend
            .query("a", "x", ScanDirection::Forward, Some(1))
            .await
            .unwrap();
        let sorts: Vec<_> = items.iter().map(|i| i.key.sort.as_str()).collect();
        assert_eq!(sorts, vec!["x1"]);
    }

    #[tokio::test]
    async fn test_batch_write_aborts_whole_batch() {
        let (backend, _temp_dir) = create_test_backend();
        backend.put_item(item("b", "1", "aws"), PutCondition::None).await.unwrap();

        let err = backend
            .batch_write(
                vec![item("a", "1", "aws"), item("b", "1", "aws")],
                PutCondition::MustNotExist,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ConditionFailed(_)));
        assert!(backend.get_item(&ItemKey::new("a", "1")).await.unwrap().is_none());

        let too_large = backend
            .batch_write(
                (0..4).map(|i| item("z", &i.to_string(), "aws")).collect(),
                PutCondition::None,
            )
            .await;
        assert!(matches!(too_large, Err(BackendError::BatchTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_delete() {
        let (backend, _temp_dir) = create_test_backend();
        backend.put_item(item("a", "1", "aws"), PutCondition::None).await.unwrap();
        assert!(backend
            .delete_item(&ItemKey::new("a", "1"), PutCondition::MustExist)
            .await
            .unwrap());
        assert!(matches!(
            backend
                .delete_item(&ItemKey::new("a", "1"), PutCondition::MustExist)
                .await,
            Err(BackendError::ConditionFailed(_))
        ));
    }
}
