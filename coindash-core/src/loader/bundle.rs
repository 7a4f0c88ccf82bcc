//! Bundle read path: memory → persistent store → network.

use crate::cache::entry::{CacheEntry, Origin};
use crate::cache::tier::fallback_saved_at;
use crate::cache::BundleCache;
use crate::coherency::{ReadyChannel, ReadyMessage, Subscription};
use crate::data::{BundleSource, DataError, Headers};
use crate::domain::{Bundle, BundleKey};
use std::sync::Arc;
use tracing::{debug, info};

/// A bundle resolved through the cache tiers.
#[derive(Debug, Clone)]
pub struct LoadedBundle {
    pub key: BundleKey,
    pub entry: CacheEntry<Bundle>,
    pub origin: Origin,
}

impl LoadedBundle {
    pub fn bundle(&self) -> &Bundle {
        &self.entry.payload
    }

    pub fn saved_at(&self) -> i64 {
        self.entry.saved_at
    }
}

pub struct BundleLoader {
    cache: Arc<BundleCache>,
    source: Arc<dyn BundleSource>,
    channel: ReadyChannel,
}

impl BundleLoader {
    pub fn new(cache: Arc<BundleCache>, source: Arc<dyn BundleSource>, channel: ReadyChannel) -> Self {
        Self {
            cache,
            source,
            channel,
        }
    }

    pub fn cache(&self) -> &Arc<BundleCache> {
        &self.cache
    }

    /// Resolve `key` from the nearest tier that has it.
    ///
    /// Network and decode errors propagate; store errors never do.
    pub async fn load(
        &self,
        key: &BundleKey,
        headers: Option<&Headers>,
    ) -> Result<LoadedBundle, DataError> {
        let cache_key = key.cache_key();
        if let Some((entry, origin)) = self.cache.read_through(&cache_key).await {
            return Ok(LoadedBundle {
                key: key.clone(),
                entry,
                origin,
            });
        }
        self.fetch(key, headers).await
    }

    /// Skip both cache tiers and fetch from the network.
    pub async fn refresh(
        &self,
        key: &BundleKey,
        headers: Option<&Headers>,
    ) -> Result<LoadedBundle, DataError> {
        self.fetch(key, headers).await
    }

    async fn fetch(
        &self,
        key: &BundleKey,
        headers: Option<&Headers>,
    ) -> Result<LoadedBundle, DataError> {
        let cache_key = key.cache_key();
        info!(key = %cache_key, "fetching bundle");
        let payload = self.source.fetch_bundle(key, headers).await?;
        let saved_at = fallback_saved_at(Some(payload.bundle.now));

        let (entry, written) = self
            .cache
            .store_fetched(&cache_key, saved_at, payload.bundle, Some(payload.bytes))
            .await;
        if written {
            self.channel.broadcast_ready(&cache_key, saved_at);
        }
        Ok(LoadedBundle {
            key: key.clone(),
            entry,
            origin: Origin::Network,
        })
    }

    /// React to another context's announcement. Returns whether the memory
    /// copy was dropped.
    pub fn apply_remote_ready(&self, msg: &ReadyMessage) -> bool {
        invalidate_if_newer(&self.cache, msg)
    }

    /// Apply announcements from other contexts until the subscription drops.
    pub fn listen(&self) -> Subscription {
        let cache = Arc::clone(&self.cache);
        self.channel
            .on_ready(move |msg| {
                invalidate_if_newer(&cache, &msg);
            })
    }
}

fn invalidate_if_newer(cache: &BundleCache, msg: &ReadyMessage) -> bool {
    match cache.memory_saved_at(&msg.key) {
        Some(local) if msg.saved_at > local => {
            debug!(key = %msg.key, local, remote = msg.saved_at, "newer bundle elsewhere; dropping memory copy");
            cache.invalidate_memory(&msg.key)
        }
        _ => false,
    }
}
