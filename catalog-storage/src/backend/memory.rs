//! In-memory backing store.
//!
//! A `BTreeMap` keyed by [`ItemKey`] gives the same ordering a partitioned
//! table scan would. Faults and latency can be injected per operation so
//! tests can exercise throttling, outages and timeouts.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{DEFAULT_BATCH_GET_LIMIT, DEFAULT_BATCH_WRITE_LIMIT};

use super::{
    scan_sorted, BackendError, BackingStore, Item, ItemKey, PutCondition, ScanDirection,
    ScanOutput, ScanRequest,
};

/// Operation selector for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    Get,
    Put,
    Delete,
    Query,
    Scan,
    BatchGet,
    BatchWrite,
}

#[derive(Debug, Default)]
struct Instrumentation {
    faults: HashMap<BackendOp, VecDeque<BackendError>>,
    calls: HashMap<BackendOp, u64>,
    latency: Option<Duration>,
}

#[derive(Debug)]
pub struct InMemoryBackend {
    items: RwLock<BTreeMap<ItemKey, Item>>,
    instrumentation: Mutex<Instrumentation>,
    batch_get_limit: usize,
    batch_write_limit: usize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_BATCH_GET_LIMIT, DEFAULT_BATCH_WRITE_LIMIT)
    }

    pub fn with_limits(batch_get_limit: usize, batch_write_limit: usize) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            instrumentation: Mutex::new(Instrumentation::default()),
            batch_get_limit: batch_get_limit.max(1),
            batch_write_limit: batch_write_limit.max(1),
        }
    }

    /// Fail the next call of `op` with `error`. Queued faults fire in order.
    pub fn inject_fault(&self, op: BackendOp, error: BackendError) {
        if let Ok(mut inst) = self.instrumentation.lock() {
            inst.faults.entry(op).or_default().push_back(error);
        }
    }

    /// Delay every call by `latency` before it touches the data.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut inst) = self.instrumentation.lock() {
            inst.latency = latency;
        }
    }

    /// Number of calls issued for `op`, failed ones included.
    pub fn call_count(&self, op: BackendOp) -> u64 {
        self.instrumentation
            .lock()
            .map(|inst| inst.calls.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count the call, wait out any latency, then surface a queued fault.
    async fn enter(&self, op: BackendOp) -> Result<(), BackendError> {
        let (latency, fault) = {
            let mut inst = self
                .instrumentation
                .lock()
                .map_err(|_| poisoned())?;
            *inst.calls.entry(op).or_insert(0) += 1;
            let fault = inst.faults.get_mut(&op).and_then(VecDeque::pop_front);
            (inst.latency, fault)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match fault {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn poisoned() -> BackendError {
    BackendError::Unavailable("in-memory backend lock poisoned".to_string())
}

#[async_trait]
impl BackingStore for InMemoryBackend {
    async fn get_item(&self, key: &ItemKey) -> Result<Option<Item>, BackendError> {
        self.enter(BackendOp::Get).await?;
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(key).cloned())
    }

    async fn put_item(&self, item: Item, condition: PutCondition) -> Result<(), BackendError> {
        self.enter(BackendOp::Put).await?;
        let mut items = self.items.write().map_err(|_| poisoned())?;
        if !condition.check(items.contains_key(&item.key)) {
            return Err(BackendError::ConditionFailed(item.key));
        }
        items.insert(item.key.clone(), item);
        Ok(())
    }

    async fn delete_item(&self, key: &ItemKey, condition: PutCondition) -> Result<bool, BackendError> {
        self.enter(BackendOp::Delete).await?;
        let mut items = self.items.write().map_err(|_| poisoned())?;
        if !condition.check(items.contains_key(key)) {
            return Err(BackendError::ConditionFailed(key.clone()));
        }
        Ok(items.remove(key).is_some())
    }

    async fn query(
        &self,
        partition: &str,
        sort_prefix: &str,
        direction: ScanDirection,
        limit: Option<usize>,
    ) -> Result<Vec<Item>, BackendError> {
        self.enter(BackendOp::Query).await?;
        let items = self.items.read().map_err(|_| poisoned())?;
        let start = ItemKey::new(partition, sort_prefix);
        let matching = items
            .range(start..)
            .take_while(|(k, _)| k.partition == partition && k.sort.starts_with(sort_prefix))
            .map(|(_, item)| item.clone());

        let mut result: Vec<Item> = match direction {
            ScanDirection::Forward => matching.collect(),
            ScanDirection::Backward => {
                let mut all: Vec<Item> = matching.collect();
                all.reverse();
                all
            }
        };
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanOutput, BackendError> {
        self.enter(BackendOp::Scan).await?;
        let items = self.items.read().map_err(|_| poisoned())?;
        let lower = match &request.exclusive_start {
            Some(start) => Bound::Excluded(start),
            None => Bound::Unbounded,
        };
        let upper: Bound<&ItemKey> = Bound::Unbounded;
        let remaining = items
            .range::<ItemKey, _>((lower, upper))
            .map(|(_, item)| Ok(item.clone()));
        scan_sorted(remaining, &request)
    }

    async fn batch_get(&self, keys: &[ItemKey]) -> Result<Vec<Item>, BackendError> {
        self.enter(BackendOp::BatchGet).await?;
        if keys.len() > self.batch_get_limit {
            return Err(BackendError::BatchTooLarge {
                size: keys.len(),
                limit: self.batch_get_limit,
            });
        }
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(keys.iter().filter_map(|k| items.get(k).cloned()).collect())
    }

    async fn batch_write(&self, batch: Vec<Item>, condition: PutCondition) -> Result<(), BackendError> {
        self.enter(BackendOp::BatchWrite).await?;
        if batch.len() > self.batch_write_limit {
            return Err(BackendError::BatchTooLarge {
                size: batch.len(),
                limit: self.batch_write_limit,
            });
        }

        let mut items = self.items.write().map_err(|_| poisoned())?;
        let mut seen = BTreeSet::new();
        for item in &batch {
            // A key repeated inside the batch counts as existing for the second write.
            let exists = items.contains_key(&item.key) || !seen.insert(&item.key);
            if !condition.check(exists) {
                return Err(BackendError::ConditionFailed(item.key.clone()));
            }
        }
        for item in batch {
            items.insert(item.key.clone(), item);
        }
        Ok(())
    }

    fn batch_get_limit(&self) -> usize {
        self.batch_get_limit
    }

    fn batch_write_limit(&self) -> usize {
        self.batch_write_limit
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(pk: &str, sk: &str) -> Item {
        Item {
            key: ItemKey::new(pk, sk),
            attributes: BTreeMap::new(),
            body: format!("{pk}/{sk}").into_bytes(),
        }
    }

    #[tokio::test]
    async fn test_conditional_put() {
        let backend = InMemoryBackend::new();
        backend
            .put_item(item("a", "1"), PutCondition::MustNotExist)
            .await
            .unwrap();
        let err = backend
            .put_item(item("a", "1"), PutCondition::MustNotExist)
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::ConditionFailed(ItemKey::new("a", "1")));

        let err = backend
            .put_item(item("a", "2"), PutCondition::MustExist)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ConditionFailed(_)));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_query_prefix_and_direction() {
        let backend = InMemoryBackend::new();
        for (pk, sk) in [("a", "x1"), ("a", "x2"), ("a", "y1"), ("b", "x1")] {
            backend.put_item(item(pk, sk), PutCondition::None).await.unwrap();
        }

        let forward = backend
            .query("a", "x", ScanDirection::Forward, None)
            .await
            .unwrap();
        let sorts: Vec<_> = forward.iter().map(|i| i.key.sort.as_str()).collect();
        assert_eq!(sorts, vec!["x1", "x2"]);

        let backward = backend
            .query("a", "", ScanDirection::Backward, Some(2))
            .await
            .unwrap();
        let sorts: Vec<_> = backward.iter().map(|i| i.key.sort.as_str()).collect();
        assert_eq!(sorts, vec!["y1", "x2"]);
    }

    #[tokio::test]
    async fn test_batch_write_is_all_or_nothing() {
        let backend = InMemoryBackend::with_limits(10, 3);
        backend.put_item(item("a", "2"), PutCondition::None).await.unwrap();

        let err = backend
            .batch_write(vec![item("a", "1"), item("a", "2")], PutCondition::MustNotExist)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ConditionFailed(_)));
        assert_eq!(backend.len(), 1);

        let dup = backend
            .batch_write(vec![item("b", "1"), item("b", "1")], PutCondition::MustNotExist)
            .await;
        assert!(dup.is_err());

        let too_large = backend
            .batch_write(
                vec![item("c", "1"), item("c", "2"), item("c", "3"), item("c", "4")],
                PutCondition::None,
            )
            .await
            .unwrap_err();
        assert_eq!(too_large, BackendError::BatchTooLarge { size: 4, limit: 3 });
    }

    #[tokio::test]
    async fn test_scan_resumes_after_start() {
        let backend = InMemoryBackend::new();
        for (pk, sk) in [("a", "1"), ("a", "2"), ("b", "1"), ("c", "1")] {
            backend.put_item(item(pk, sk), PutCondition::None).await.unwrap();
        }

        let out = backend
            .scan(ScanRequest {
                filters: vec![],
                limit: 1,
                exclusive_start: Some(ItemKey::new("a", "2")),
            })
            .await
            .unwrap();
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].key, ItemKey::new("b", "1"));
        assert_eq!(out.last_evaluated_key, Some(ItemKey::new("b", "1")));

        let tail = backend
            .scan(ScanRequest {
                filters: vec![],
                limit: 5,
                exclusive_start: out.last_evaluated_key,
            })
            .await
            .unwrap();
        assert_eq!(tail.items.len(), 1);
        assert!(tail.last_evaluated_key.is_none());
    }

    #[tokio::test]
    async fn test_batch_get_omits_missing() {
        let backend = InMemoryBackend::new();
        backend.put_item(item("a", "1"), PutCondition::None).await.unwrap();
        let got = backend
            .batch_get(&[ItemKey::new("a", "1"), ItemKey::new("a", "9")])
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection_fires_once() {
        let backend = InMemoryBackend::new();
        backend.inject_fault(BackendOp::Get, BackendError::Throttled);

        let first = backend.get_item(&ItemKey::new("a", "1")).await;
        assert_eq!(first, Err(BackendError::Throttled));
        let second = backend.get_item(&ItemKey::new("a", "1")).await;
        assert_eq!(second, Ok(None));
        assert_eq!(backend.call_count(BackendOp::Get), 2);
    }

    #[tokio::test]
    async fn test_delete_with_condition() {
        let backend = InMemoryBackend::new();
        backend.put_item(item("a", "1"), PutCondition::None).await.unwrap();
        assert!(backend
            .delete_item(&ItemKey::new("a", "1"), PutCondition::MustExist)
            .await
            .unwrap());
        assert!(backend
            .delete_item(&ItemKey::new("a", "1"), PutCondition::MustExist)
            .await
            .is_err());
        assert!(!backend
            .delete_item(&ItemKey::new("a", "1"), PutCondition::None)
            .await
            .unwrap());
    }
}
