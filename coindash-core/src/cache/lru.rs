//! Bounded in-memory LRU tier.
//!
//! Backed by an `IndexMap` kept in recency order: index 0 is the least recently
//! used entry, the tail is the most recent. Lookups hash; promotion moves the
//! entry to the tail. Capacities are small (single digits), so the shift on
//! promotion is negligible.

use super::entry::CacheEntry;
use indexmap::IndexMap;

#[derive(Debug)]
pub struct MemoryLru<T> {
    capacity: usize,
    map: IndexMap<String, CacheEntry<T>>,
}

impl<T> MemoryLru<T> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: IndexMap::with_capacity(capacity + 1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up and promote to most-recently-used.
    pub fn get(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.map.shift_remove(key)?;
        self.map.insert(key.to_string(), entry.clone());
        Some(entry)
    }

    /// Look up without touching recency.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.map.get(key)
    }

    /// Insert or overwrite as most-recently-used.
    ///
    /// Returns the key evicted to stay within capacity, if any.
    pub fn set(&mut self, key: impl Into<String>, entry: CacheEntry<T>) -> Option<String> {
        let key = key.into();
        self.map.shift_remove(&key);
        self.map.insert(key, entry);
        if self.map.len() > self.capacity {
            return self.map.shift_remove_index(0).map(|(k, _)| k);
        }
        None
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<T>> {
        self.map.shift_remove(key)
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<&str> {
        self.map.keys().map(|k| k.as_str()).collect()
    }
}
