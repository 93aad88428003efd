//! LMDB-backed TTL cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) so cached definitions
//! survive process restarts. Expiry is wall-clock based for the same reason.
//!
//! # Value Format
//!
//! `[expires_at: 8 bytes, i64 millis LE][payload]`
//!
//! Expired entries are treated as misses and removed on the next access.
//! Inserting a new key into a full cache first sweeps every expired entry,
//! then evicts the entry closest to expiry if the sweep freed nothing.

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use catalog_core::{CatalogError, CatalogResult, StorageError};
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};

use super::key::CacheKey;
use super::traits::{CacheStats, ComponentCache};

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CatalogError {
    fn from(e: LmdbCacheError) -> Self {
        CatalogError::Storage(StorageError::Unavailable {
            operation: "lmdb_cache".to_string(),
            reason: e.to_string(),
        })
    }
}

const HEADER_LEN: usize = 8;

/// LMDB-backed cache.
pub struct LmdbCache {
    env: Env,
    db: Database<Bytes, Bytes>,
    max_entries: usize,
    stats: RwLock<CacheStats>,
}

impl LmdbCache {
    /// Open (or create) a cache environment under `path` holding at most
    /// `max_entries` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn new<P: AsRef<Path>>(
        path: P,
        max_size_mb: usize,
        max_entries: usize,
    ) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        let existing = db.len(&wtxn).unwrap_or(0);
        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            max_entries: max_entries.max(1),
            stats: RwLock::new(CacheStats {
                entry_count: existing,
                ..CacheStats::default()
            }),
        })
    }

    fn update_stats(&self, f: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }

    /// Read the raw entry, returning `(expired, payload)`.
    fn read_entry(&self, encoded_key: &[u8]) -> Result<Option<(bool, Vec<u8>)>, LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let bytes = match self
            .db
            .get(&rtxn, encoded_key)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?
        {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        // A truncated header is unreadable; report it as expired so it is purged.
        let Some(deadline) = expires_at(bytes) else {
            return Ok(Some((true, Vec::new())));
        };
        let expired = deadline <= Utc::now().timestamp_millis();
        Ok(Some((expired, bytes[HEADER_LEN..].to_vec())))
    }

    /// Free at least one slot. Removes every expired entry, or the entry
    /// closest to expiry when none has expired. Returns the number removed.
    fn make_room(&self, wtxn: &mut RwTxn<'_>, now_millis: i64) -> Result<u64, LmdbCacheError> {
        let mut expired = Vec::new();
        let mut soonest: Option<(i64, Vec<u8>)> = None;
        for entry in self.db.iter(&*wtxn).map_err(transaction_error)? {
            let (raw_key, raw_value) = entry.map_err(transaction_error)?;
            let at = expires_at(raw_value).unwrap_or(i64::MIN);
            if at <= now_millis {
                expired.push(raw_key.to_vec());
            } else if soonest.as_ref().map_or(true, |(best, _)| at < *best) {
                soonest = Some((at, raw_key.to_vec()));
            }
        }

        let victims = if expired.is_empty() {
            soonest.map(|(_, key)| key).into_iter().collect()
        } else {
            expired
        };
        for victim in &victims {
            self.db
                .delete(wtxn, victim.as_slice())
                .map_err(transaction_error)?;
        }
        Ok(victims.len() as u64)
    }

    fn remove(&self, encoded_key: &[u8]) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let deleted = self
            .db
            .delete(&mut wtxn, encoded_key)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        Ok(deleted)
    }
}

fn transaction_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// Expiry stamp from a stored value, `None` when the header is truncated.
fn expires_at(bytes: &[u8]) -> Option<i64> {
    let header: [u8; HEADER_LEN] = bytes.get(0..HEADER_LEN)?.try_into().ok()?;
    Some(i64::from_le_bytes(header))
}

#[async_trait]
impl ComponentCache for LmdbCache {
    async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let encoded_key = key.encode();
        match self.read_entry(encoded_key.as_bytes()) {
            Ok(Some((false, payload))) => {
                self.update_stats(|s| s.hits += 1);
                Some(payload)
            }
            Ok(Some((true, _))) => {
                if let Ok(true) = self.remove(encoded_key.as_bytes()) {
                    self.update_stats(|s| {
                        s.evictions += 1;
                        s.entry_count = s.entry_count.saturating_sub(1);
                    });
                }
                self.update_stats(|s| s.misses += 1);
                None
            }
            Ok(None) => {
                self.update_stats(|s| s.misses += 1);
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "LMDB cache read failed");
                self.update_stats(|s| s.misses += 1);
                None
            }
        }
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> CatalogResult<()> {
        let encoded_key = key.encode();
        let now_millis = Utc::now().timestamp_millis();
        let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let deadline = now_millis.saturating_add(ttl_millis);

        let mut full_bytes = Vec::with_capacity(HEADER_LEN + value.len());
        full_bytes.extend_from_slice(&deadline.to_le_bytes());
        full_bytes.extend_from_slice(&value);

        let mut wtxn = self.env.write_txn().map_err(transaction_error)?;
        let is_new = self
            .db
            .get(&wtxn, encoded_key.as_bytes())
            .map_err(transaction_error)?
            .is_none();

        let mut evicted = 0u64;
        if is_new {
            let len = self.db.len(&wtxn).map_err(transaction_error)?;
            if len >= self.max_entries as u64 {
                evicted = self.make_room(&mut wtxn, now_millis)?;
            }
        }

        self.db
            .put(&mut wtxn, encoded_key.as_bytes(), &full_bytes)
            .map_err(transaction_error)?;
        let entry_count = self.db.len(&wtxn).map_err(transaction_error)?;
        wtxn.commit().map_err(transaction_error)?;

        self.update_stats(|s| {
            s.evictions += evicted;
            s.entry_count = entry_count;
        });
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> CatalogResult<()> {
        if self.remove(key.encode().as_bytes())? {
            self.update_stats(|s| s.entry_count = s.entry_count.saturating_sub(1));
        }
        Ok(())
    }

    async fn exists(&self, key: &CacheKey) -> bool {
        matches!(self.read_entry(key.encode().as_bytes()), Ok(Some((false, _))))
    }

    async fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    async fn ping(&self) -> CatalogResult<()> {
        self.env
            .read_txn()
            .map(|_| ())
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()).into())
    }

    fn kind(&self) -> &'static str {
        "lmdb"
    }
}
