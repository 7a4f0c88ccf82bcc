//! Market-order read path: memory → persistent store → full cursor walk.

use crate::cache::entry::Origin;
use crate::cache::OrderCache;
use crate::data::order_pager::fetch_order_all;
use crate::data::{DataError, OrderPageSource};
use crate::domain::{OrderEntry, OrderQuery};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedOrder {
    pub entry: OrderEntry,
    pub origin: Origin,
}

pub struct MarketOrderCache {
    cache: Arc<OrderCache>,
    source: Arc<dyn OrderPageSource>,
    page_limit: Option<usize>,
}

impl MarketOrderCache {
    pub fn new(cache: Arc<OrderCache>, source: Arc<dyn OrderPageSource>) -> Self {
        Self {
            cache,
            source,
            page_limit: None,
        }
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = Some(limit);
        self
    }

    pub fn cache(&self) -> &Arc<OrderCache> {
        &self.cache
    }

    pub async fn load(&self, query: &OrderQuery) -> Result<LoadedOrder, DataError> {
        let key = query.cache_key();
        if let Some((hit, origin)) = self.cache.read_through(&key).await {
            return Ok(LoadedOrder {
                entry: OrderEntry {
                    saved_at: hit.saved_at,
                    order: hit.payload.as_ref().clone(),
                },
                origin,
            });
        }

        info!(%key, "walking market order listing");
        let entry = fetch_order_all(self.source.as_ref(), query, self.page_limit).await?;
        self.cache
            .store_fetched(&key, entry.saved_at, entry.order.clone(), None)
            .await;
        Ok(LoadedOrder {
            entry,
            origin: Origin::Network,
        })
    }

    /// Symbols to the left and right of `symbol` in the listing for `query`.
    pub async fn neighbors(
        &self,
        query: &OrderQuery,
        symbol: &str,
    ) -> Result<Option<(String, String)>, DataError> {
        Ok(self.load(query).await?.entry.neighbors(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::{MemoryStore, PersistentStore};
    use crate::cache::ORDER_CAPACITY;
    use crate::data::OrderPage;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Two pages: `[btc, eth]` then `[sol]`.
    struct TwoPages {
        calls: Mutex<Vec<(u64, usize)>>,
    }

    impl TwoPages {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OrderPageSource for TwoPages {
        async fn fetch_order_page(
            &self,
            _query: &OrderQuery,
            cursor: u64,
            limit: usize,
        ) -> Result<OrderPage, DataError> {
            self.calls.lock().push((cursor, limit));
            Ok(match cursor {
                0 => OrderPage {
                    order: vec!["btc".into(), "eth".into()],
                    cursor_next: Some(2),
                    server_time_ms: Some(1_700),
                },
                _ => OrderPage {
                    order: vec!["sol".into()],
                    cursor_next: None,
                    server_time_ms: None,
                },
            })
        }
    }

    fn query() -> OrderQuery {
        OrderQuery::new("spot", "all", "24h", "volume", "desc")
    }

    fn cache(store: Arc<dyn PersistentStore>, source: Arc<TwoPages>) -> MarketOrderCache {
        MarketOrderCache::new(Arc::new(OrderCache::orders(store, ORDER_CAPACITY)), source)
    }

    #[tokio::test]
    async fn walks_once_then_serves_from_tiers() {
        let store: Arc<dyn PersistentStore> = Arc::new(MemoryStore::new("order"));
        let source = Arc::new(TwoPages::new());
        let orders = cache(store.clone(), source.clone()).with_page_limit(2);

        let first = orders.load(&query()).await.unwrap();
        assert_eq!(first.origin, Origin::Network);
        assert_eq!(first.entry.order, vec!["BTC", "ETH", "SOL"]);
        assert_eq!(first.entry.saved_at, 1_700);
        assert_eq!(*source.calls.lock(), vec![(0, 2), (2, 2)]);

        assert_eq!(orders.load(&query()).await.unwrap().origin, Origin::Memory);

        let other = cache(store, source.clone());
        let from_disk = other.load(&query()).await.unwrap();
        assert_eq!(from_disk.origin, Origin::Persistent);
        assert_eq!(from_disk.entry, first.entry);
        assert_eq!(source.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn neighbors_for_navigation() {
        let orders = cache(Arc::new(MemoryStore::new("order")), Arc::new(TwoPages::new()));
        let around = orders.neighbors(&query(), "eth").await.unwrap();
        assert_eq!(around, Some(("BTC".into(), "SOL".into())));
        assert_eq!(orders.neighbors(&query(), "DOGE").await.unwrap(), None);
    }
}
