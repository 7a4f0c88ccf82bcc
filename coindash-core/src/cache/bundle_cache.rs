//! Bundle cache domain: decoded bundles in memory, MessagePack bytes on disk.

use super::store::PersistentStore;
use super::tier::{PayloadCodec, TierCapacity, TwoTierCache};
use crate::data::codec::{decode_bundle_bytes, encode_bundle};
use crate::domain::Bundle;
use std::sync::Arc;

pub const BUNDLE_DATABASE: &str = "chart_bundle_cache";
pub const BUNDLE_STORE: &str = "bundle";

pub const BUNDLE_CAPACITY: TierCapacity = TierCapacity {
    memory: 5,
    persistent: 50,
};

/// MessagePack, the same bytes the network delivers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundleCodec;

impl PayloadCodec<Bundle> for BundleCodec {
    fn encode(&self, payload: &Bundle) -> Result<Vec<u8>, String> {
        encode_bundle(payload).map_err(|e| e.to_string())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Bundle, String> {
        decode_bundle_bytes(bytes).map_err(|e| e.to_string())
    }
}

pub type BundleCache = TwoTierCache<Bundle, BundleCodec>;

impl TwoTierCache<Bundle, BundleCodec> {
    pub fn bundles(store: Arc<dyn PersistentStore>, capacity: TierCapacity) -> Self {
        TwoTierCache::new(store, capacity, BundleCodec)
    }
}
