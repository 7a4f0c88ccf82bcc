//! Two-tier caching: in-memory LRU over a best-effort persistent store

pub mod bundle_cache;
pub mod entry;
pub mod fs_store;
pub mod lru;
pub mod order_cache;
pub mod store;
pub mod tier;

pub use bundle_cache::{BundleCache, BundleCodec, BUNDLE_CAPACITY};
pub use entry::{CacheEntry, Origin, RecordMeta, StoredRecord};
pub use fs_store::FsStore;
pub use lru::MemoryLru;
pub use order_cache::{OrderCache, OrderCodec, ORDER_CAPACITY};
pub use store::{DisabledStore, MemoryStore, PersistentStore, StoreError};
pub use tier::{PayloadCodec, TierCapacity, TwoTierCache};
