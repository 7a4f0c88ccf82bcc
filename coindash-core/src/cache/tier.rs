//! Two-tier cache: bounded memory LRU in front of a persistent store.
//!
//! The persistent tier is best-effort. Its read path returns `Option` and its
//! write path returns whether the write landed; store and decode failures are
//! logged and degrade to "absent". Nothing here can make a caller fail.

use super::entry::{now_ms, CacheEntry, Origin, RecencyClock, StoredRecord};
use super::lru::MemoryLru;
use super::store::PersistentStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Converts a payload to and from the bytes the persistent tier stores.
pub trait PayloadCodec<T>: Send + Sync {
    fn encode(&self, payload: &T) -> Result<Vec<u8>, String>;
    fn decode(&self, bytes: &[u8]) -> Result<T, String>;
}

/// Capacities for one cache domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierCapacity {
    pub memory: usize,
    pub persistent: usize,
}

pub struct TwoTierCache<T, C> {
    memory: Mutex<MemoryLru<T>>,
    store: Arc<dyn PersistentStore>,
    persistent_capacity: usize,
    codec: C,
    clock: RecencyClock,
}

impl<T, C> TwoTierCache<T, C>
where
    T: Send + Sync,
    C: PayloadCodec<T>,
{
    pub fn new(store: Arc<dyn PersistentStore>, capacity: TierCapacity, codec: C) -> Self {
        Self {
            memory: Mutex::new(MemoryLru::new(capacity.memory)),
            store,
            persistent_capacity: capacity.persistent.max(1),
            codec,
            clock: RecencyClock::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn capacity(&self) -> TierCapacity {
        TierCapacity {
            memory: self.memory.lock().capacity(),
            persistent: self.persistent_capacity,
        }
    }

    // ── Memory tier ──────────────────────────────────────────────────

    /// Lookup that promotes the entry to most-recently-used.
    pub fn get_memory(&self, key: &str) -> Option<CacheEntry<T>> {
        self.memory.lock().get(key)
    }

    /// `saved_at` of the in-memory entry, without touching recency.
    pub fn memory_saved_at(&self, key: &str) -> Option<i64> {
        self.memory.lock().peek(key).map(|e| e.saved_at)
    }

    pub fn set_memory(&self, key: &str, entry: CacheEntry<T>) {
        if let Some(evicted) = self.memory.lock().set(key, entry) {
            debug!(store = %self.store.name(), %evicted, "memory tier evicted");
        }
    }

    pub fn invalidate_memory(&self, key: &str) -> bool {
        self.memory.lock().remove(key).is_some()
    }

    pub fn clear_memory(&self) {
        self.memory.lock().clear();
    }

    /// Memory keys, least to most recently used.
    pub fn memory_keys(&self) -> Vec<String> {
        self.memory
            .lock()
            .keys()
            .into_iter()
            .map(String::from)
            .collect()
    }

    // ── Persistent tier ──────────────────────────────────────────────

    /// Read a row, refresh its `accessed_at`, and decode it.
    pub async fn get_persistent(&self, key: &str) -> Option<CacheEntry<T>> {
        let row = match self.store.get(key).await {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(e) => {
                debug!(store = %self.store.name(), %key, error = %e, "persistent read failed");
                return None;
            }
        };

        if let Err(e) = self.store.touch(key, self.clock.tick()).await {
            debug!(store = %self.store.name(), %key, error = %e, "persistent touch failed");
        }

        match self.codec.decode(&row.data) {
            Ok(payload) => Some(CacheEntry::new(row.saved_at, payload)),
            Err(e) => {
                warn!(store = %self.store.name(), %key, error = %e, "undecodable persistent row");
                if let Err(e) = self.store.remove(key).await {
                    debug!(store = %self.store.name(), %key, error = %e, "dropping undecodable row failed");
                }
                None
            }
        }
    }

    /// Upsert raw bytes, then prune to capacity. Returns whether the row landed.
    pub async fn set_persistent(&self, key: &str, saved_at: i64, data: Vec<u8>) -> bool {
        let record = StoredRecord {
            key: key.to_string(),
            saved_at,
            accessed_at: self.clock.tick(),
            data,
        };
        if let Err(e) = self.store.put(record).await {
            warn!(store = %self.store.name(), %key, error = %e, "persistent write failed");
            return false;
        }
        match self.store.prune(self.persistent_capacity).await {
            Ok(0) => {}
            Ok(n) => debug!(store = %self.store.name(), pruned = n, "persistent tier pruned"),
            Err(e) => debug!(store = %self.store.name(), error = %e, "persistent prune failed"),
        }
        true
    }

    /// Encode `payload` with the codec and store it.
    pub async fn set_persistent_payload(&self, key: &str, entry: &CacheEntry<T>) -> bool {
        match self.codec.encode(&entry.payload) {
            Ok(bytes) => self.set_persistent(key, entry.saved_at, bytes).await,
            Err(e) => {
                warn!(store = %self.store.name(), %key, error = %e, "payload encode failed");
                false
            }
        }
    }

    // ── Read path ────────────────────────────────────────────────────

    /// Memory first, then persistent (promoting a hit into memory).
    pub async fn read_through(&self, key: &str) -> Option<(CacheEntry<T>, Origin)> {
        if let Some(entry) = self.get_memory(key) {
            debug!(store = %self.store.name(), %key, "memory hit");
            return Some((entry, Origin::Memory));
        }
        let entry = self.get_persistent(key).await?;
        debug!(store = %self.store.name(), %key, "persistent hit");
        self.set_memory(key, entry.clone());
        Some((entry, Origin::Persistent))
    }

    /// Populate both tiers after a network fetch. `bytes` skips re-encoding.
    pub async fn store_fetched(
        &self,
        key: &str,
        saved_at: i64,
        payload: T,
        bytes: Option<Vec<u8>>,
    ) -> (CacheEntry<T>, bool) {
        let entry = CacheEntry::new(saved_at, payload);
        self.set_memory(key, entry.clone());
        let written = match bytes {
            Some(bytes) => self.set_persistent(key, saved_at, bytes).await,
            None => self.set_persistent_payload(key, &entry).await,
        };
        (entry, written)
    }
}

/// Timestamp used when a payload carries no server time.
pub fn fallback_saved_at(server_time: Option<i64>) -> i64 {
    server_time.filter(|t| *t > 0).unwrap_or_else(now_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::RecordMeta;
    use crate::cache::store::{DisabledStore, MemoryStore, StoreError};

    struct Utf8Codec;

    impl PayloadCodec<String> for Utf8Codec {
        fn encode(&self, payload: &String) -> Result<Vec<u8>, String> {
            Ok(payload.as_bytes().to_vec())
        }

        fn decode(&self, bytes: &[u8]) -> Result<String, String> {
            String::from_utf8(bytes.to_vec()).map_err(|e| e.to_string())
        }
    }

    fn cache(store: Arc<dyn PersistentStore>) -> TwoTierCache<String, Utf8Codec> {
        TwoTierCache::new(store, TierCapacity { memory: 2, persistent: 3 }, Utf8Codec)
    }

    #[tokio::test]
    async fn read_through_promotes_persistent_hit_into_memory() {
        let store = Arc::new(MemoryStore::new("t"));
        let c = cache(store.clone());
        assert!(c.set_persistent("k", 7, b"hello".to_vec()).await);

        let (entry, origin) = c.read_through("k").await.unwrap();
        assert_eq!(origin, Origin::Persistent);
        assert_eq!(*entry.payload, "hello");
        assert_eq!(entry.saved_at, 7);

        let (_, origin) = c.read_through("k").await.unwrap();
        assert_eq!(origin, Origin::Memory);
    }

    #[tokio::test]
    async fn persistent_hit_refreshes_accessed_at() {
        let store = Arc::new(MemoryStore::new("t"));
        let c = cache(store.clone());
        c.set_persistent("k", 1, b"v".to_vec()).await;
        let before = store.get("k").await.unwrap().unwrap().accessed_at;

        c.get_persistent("k").await.unwrap();
        let after = store.get("k").await.unwrap().unwrap().accessed_at;
        assert!(after > before);
    }

    #[tokio::test]
    async fn set_persistent_prunes_to_capacity() {
        let store = Arc::new(MemoryStore::new("t"));
        let c = cache(store.clone());
        for key in ["a", "b", "c", "d", "e"] {
            c.set_persistent(key, 0, key.as_bytes().to_vec()).await;
        }
        assert_eq!(store.len(), 3);
        assert!(c.get_persistent("a").await.is_none());
        assert!(c.get_persistent("e").await.is_some());
    }

    #[tokio::test]
    async fn undecodable_row_is_a_miss_and_is_dropped() {
        let store = Arc::new(MemoryStore::new("t"));
        let c = cache(store.clone());
        c.set_persistent("bad", 0, vec![0xff, 0xfe]).await;
        assert!(c.get_persistent("bad").await.is_none());
        assert!(store.is_empty());
    }

    /// Serves rows but refuses to delete them.
    struct UndeletableStore(MemoryStore);

    #[async_trait::async_trait]
    impl PersistentStore for UndeletableStore {
        fn name(&self) -> &str {
            self.0.name()
        }

        async fn get(&self, key: &str) -> Result<Option<StoredRecord>, StoreError> {
            self.0.get(key).await
        }

        async fn put(&self, record: StoredRecord) -> Result<(), StoreError> {
            self.0.put(record).await
        }

        async fn touch(&self, key: &str, accessed_at: i64) -> Result<(), StoreError> {
            self.0.touch(key, accessed_at).await
        }

        async fn remove(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Io("read-only".into()))
        }

        async fn list(&self) -> Result<Vec<RecordMeta>, StoreError> {
            self.0.list().await
        }

        async fn clear(&self) -> Result<usize, StoreError> {
            self.0.clear().await
        }
    }

    #[tokio::test]
    async fn failed_drop_of_undecodable_row_is_still_a_miss() {
        let store = Arc::new(UndeletableStore(MemoryStore::new("t")));
        let c = cache(store.clone());
        c.set_persistent("bad", 0, vec![0xff, 0xfe]).await;

        assert!(c.get_persistent("bad").await.is_none());
        assert!(c.get_persistent("bad").await.is_none());
        assert!(store.get("bad").await.unwrap().is_some());
        assert!(c.read_through("bad").await.is_none());
    }

    #[tokio::test]
    async fn disabled_store_degrades_to_memory_only() {
        let c = cache(Arc::new(DisabledStore::new("off")));
        assert!(c.get_persistent("k").await.is_none());

        let (entry, written) = c.store_fetched("k", 3, "v".to_string(), None).await;
        assert!(!written);
        assert_eq!(*entry.payload, "v");
        let (hit, origin) = c.read_through("k").await.unwrap();
        assert_eq!(origin, Origin::Memory);
        assert_eq!(hit.saved_at, 3);
    }

    #[test]
    fn memory_tier_is_bounded() {
        let c = cache(Arc::new(MemoryStore::new("t")));
        c.set_memory("a", CacheEntry::new(0, "a".into()));
        c.set_memory("b", CacheEntry::new(0, "b".into()));
        c.get_memory("a");
        c.set_memory("c", CacheEntry::new(0, "c".into()));
        assert_eq!(c.memory_keys(), vec!["a", "c"]);
        assert_eq!(c.capacity(), TierCapacity { memory: 2, persistent: 3 });
    }

    #[test]
    fn fallback_saved_at_prefers_server_time() {
        assert_eq!(fallback_saved_at(Some(42)), 42);
        assert!(fallback_saved_at(None) > 0);
        assert!(fallback_saved_at(Some(0)) > 0);
    }
}
