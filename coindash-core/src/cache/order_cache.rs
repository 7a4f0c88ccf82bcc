//! Market-order cache domain: symbol lists, JSON-encoded on disk.

use super::store::PersistentStore;
use super::tier::{PayloadCodec, TierCapacity, TwoTierCache};
use std::sync::Arc;

pub const ORDER_DATABASE: &str = "market_order_cache";
pub const ORDER_STORE: &str = "order";

pub const ORDER_CAPACITY: TierCapacity = TierCapacity {
    memory: 8,
    persistent: 20,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct OrderCodec;

impl PayloadCodec<Vec<String>> for OrderCodec {
    fn encode(&self, payload: &Vec<String>) -> Result<Vec<u8>, String> {
        serde_json::to_vec(payload).map_err(|e| e.to_string())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<String>, String> {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }
}

pub type OrderCache = TwoTierCache<Vec<String>, OrderCodec>;

impl TwoTierCache<Vec<String>, OrderCodec> {
    pub fn orders(store: Arc<dyn PersistentStore>, capacity: TierCapacity) -> Self {
        TwoTierCache::new(store, capacity, OrderCodec)
    }
}
