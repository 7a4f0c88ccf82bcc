//! Persistent key/value tier.
//!
//! The `PersistentStore` trait abstracts over where rows live (filesystem,
//! process memory, nowhere) so the two-tier cache can be tested and can run
//! with persistence turned off. Implementations report failures as
//! `StoreError`; the cache layer above decides to swallow them.

use super::entry::{RecordMeta, StoredRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(String),

    #[error("store serialization error: {0}")]
    Serde(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e.to_string())
    }
}

/// Durable rows indexed by key, prunable by `accessed_at`.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Store identifier, e.g. `chart_bundle_cache/bundle`.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError>;

    /// Insert or replace the row for `record.key`.
    async fn put(&self, record: StoredRecord) -> Result<(), StoreError>;

    /// Update `accessed_at` of an existing row. Missing rows are ignored.
    async fn touch(&self, key: &str, accessed_at: i64) -> Result<(), StoreError>;

    /// Returns whether a row was removed.
    async fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Metadata of every row, unordered.
    async fn list(&self) -> Result<Vec<RecordMeta>, StoreError>;

    /// Remove every row; returns how many were removed.
    async fn clear(&self) -> Result<usize, StoreError>;

    /// Delete the least recently accessed rows until at most `capacity` remain.
    ///
    /// Returns the number of rows deleted.
    async fn prune(&self, capacity: usize) -> Result<usize, StoreError> {
        let mut rows = self.list().await?;
        if rows.len() <= capacity {
            return Ok(0);
        }
        rows.sort_by(|a, b| {
            a.accessed_at
                .cmp(&b.accessed_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        let excess = rows.len() - capacity;
        let mut removed = 0;
        for row in rows.iter().take(excess) {
            if self.remove(&row.key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Process-local store. Useful for tests and ephemeral sessions.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    rows: Mutex<HashMap<String, StoredRecord>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.rows.lock().get(key).cloned())
    }

    async fn put(&self, record: StoredRecord) -> Result<(), StoreError> {
        self.rows.lock().insert(record.key.clone(), record);
        Ok(())
    }

    async fn touch(&self, key: &str, accessed_at: i64) -> Result<(), StoreError> {
        if let Some(row) = self.rows.lock().get_mut(key) {
            row.accessed_at = accessed_at;
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.rows.lock().remove(key).is_some())
    }

    async fn list(&self) -> Result<Vec<RecordMeta>, StoreError> {
        Ok(self.rows.lock().values().map(StoredRecord::meta).collect())
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let mut rows = self.rows.lock();
        let n = rows.len();
        rows.clear();
        Ok(n)
    }
}

/// A store that is never available. Every call fails.
#[derive(Debug)]
pub struct DisabledStore {
    name: String,
}

impl DisabledStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn unavailable(&self) -> StoreError {
        StoreError::Unavailable(format!("{} is disabled", self.name))
    }
}

#[async_trait]
impl PersistentStore for DisabledStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, _key: &str) -> Result<Option<StoredRecord>, StoreError> {
        Err(self.unavailable())
    }

    async fn put(&self, _record: StoredRecord) -> Result<(), StoreError> {
        Err(self.unavailable())
    }

    async fn touch(&self, _key: &str, _accessed_at: i64) -> Result<(), StoreError> {
        Err(self.unavailable())
    }

    async fn remove(&self, _key: &str) -> Result<bool, StoreError> {
        Err(self.unavailable())
    }

    async fn list(&self) -> Result<Vec<RecordMeta>, StoreError> {
        Err(self.unavailable())
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        Err(self.unavailable())
    }
}
