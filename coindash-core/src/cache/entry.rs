//! Cache entries, persistent records, and the recency clock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A cached value as handed to callers.
///
/// The payload is shared and immutable; the only way to change what a key
/// maps to is to `set` a new entry.
#[derive(Debug)]
pub struct CacheEntry<T> {
    pub saved_at: i64,
    pub payload: Arc<T>,
}

impl<T> CacheEntry<T> {
    pub fn new(saved_at: i64, payload: T) -> Self {
        Self {
            saved_at,
            payload: Arc::new(payload),
        }
    }
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            saved_at: self.saved_at,
            payload: Arc::clone(&self.payload),
        }
    }
}

/// Where a value was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    Memory,
    Persistent,
    Network,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Origin::Memory => "memory",
            Origin::Persistent => "persistent",
            Origin::Network => "network",
        };
        f.write_str(s)
    }
}

/// Row metadata of the persistent tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    pub key: String,
    pub saved_at: i64,
    pub accessed_at: i64,
}

/// A full persistent-tier row: metadata plus the encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub key: String,
    pub saved_at: i64,
    pub accessed_at: i64,
    pub data: Vec<u8>,
}

impl StoredRecord {
    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            key: self.key.clone(),
            saved_at: self.saved_at,
            accessed_at: self.accessed_at,
        }
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Wall-clock milliseconds that never repeat or go backwards within a process.
///
/// Access stamps from the same millisecond would otherwise tie and make
/// least-recently-accessed pruning ambiguous.
#[derive(Debug, Default)]
pub struct RecencyClock {
    last: AtomicI64,
}

impl RecencyClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> i64 {
        let now = now_ms();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}
