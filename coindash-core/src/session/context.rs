//! Application-level registry of the cache domains and their loaders.
//!
//! One `ChartContext` per execution context. Contexts built over the same
//! stores and the same `CoherencyBus` behave like browser tabs of one origin:
//! they share the persistent tier and hear each other's announcements.

use super::chart::ChartSession;
use crate::cache::bundle_cache::{BUNDLE_DATABASE, BUNDLE_STORE};
use crate::cache::order_cache::{ORDER_DATABASE, ORDER_STORE};
use crate::cache::{BundleCache, FsStore, MemoryStore, OrderCache, PersistentStore, TierCapacity};
use crate::coherency::{CoherencyBus, BUNDLE_CHANNEL};
use crate::config::AppConfig;
use crate::data::{BundleSource, DataError, HistorySource, HttpApi, OrderPageSource};
use crate::indicator_config::IndicatorConfigStore;
use crate::loader::{BundleLoader, MarketOrderCache};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Where bundles, history pages and market-order pages come from.
#[derive(Clone)]
pub struct Sources {
    pub bundles: Arc<dyn BundleSource>,
    pub history: Arc<dyn HistorySource>,
    pub orders: Arc<dyn OrderPageSource>,
}

impl Sources {
    pub fn from_api(api: HttpApi) -> Self {
        let api = Arc::new(api);
        Self {
            bundles: api.clone(),
            history: api.clone(),
            orders: api,
        }
    }
}

/// Persistent tier of each cache domain.
#[derive(Clone)]
pub struct Stores {
    pub bundles: Arc<dyn PersistentStore>,
    pub orders: Arc<dyn PersistentStore>,
}

impl Stores {
    pub fn on_disk(data_dir: &Path) -> Self {
        Self {
            bundles: Arc::new(FsStore::new(data_dir, BUNDLE_DATABASE, BUNDLE_STORE)),
            orders: Arc::new(FsStore::new(data_dir, ORDER_DATABASE, ORDER_STORE)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            bundles: Arc::new(MemoryStore::new(format!("{BUNDLE_DATABASE}/{BUNDLE_STORE}"))),
            orders: Arc::new(MemoryStore::new(format!("{ORDER_DATABASE}/{ORDER_STORE}"))),
        }
    }
}

/// Snapshot of one cache domain for `cache status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    pub store: String,
    pub memory_entries: usize,
    pub capacity: (usize, usize),
    /// `None` when the persistent tier could not be listed.
    pub persistent_rows: Option<usize>,
    pub newest_saved_at: Option<i64>,
}

pub struct ChartContext {
    bundles: Arc<BundleCache>,
    orders: Arc<OrderCache>,
    bundle_loader: Arc<BundleLoader>,
    market_orders: Arc<MarketOrderCache>,
    history: Arc<dyn HistorySource>,
    indicator_store: IndicatorConfigStore,
}

impl ChartContext {
    /// HTTP sources and on-disk stores under `config.data_dir`.
    pub fn from_config(config: &AppConfig, bus: &CoherencyBus) -> Result<Self, DataError> {
        let api = HttpApi::new(&config.api_base, &config.user_agent, config.request_timeout())?;
        Ok(Self::build(
            config,
            Sources::from_api(api),
            Stores::on_disk(&config.data_dir),
            bus,
        ))
    }

    pub fn build(config: &AppConfig, sources: Sources, stores: Stores, bus: &CoherencyBus) -> Self {
        let bundles = Arc::new(BundleCache::bundles(stores.bundles, config.bundle_capacity()));
        let orders = Arc::new(OrderCache::orders(stores.orders, config.order_capacity()));
        let bundle_loader = Arc::new(BundleLoader::new(
            Arc::clone(&bundles),
            sources.bundles,
            bus.open(BUNDLE_CHANNEL),
        ));
        let market_orders = Arc::new(
            MarketOrderCache::new(Arc::clone(&orders), sources.orders)
                .with_page_limit(config.order.page_limit),
        );
        Self {
            bundles,
            orders,
            bundle_loader,
            market_orders,
            history: sources.history,
            indicator_store: IndicatorConfigStore::new(&config.data_dir),
        }
    }

    pub fn bundle_loader(&self) -> &Arc<BundleLoader> {
        &self.bundle_loader
    }

    pub fn market_orders(&self) -> &Arc<MarketOrderCache> {
        &self.market_orders
    }

    pub fn indicator_store(&self) -> &IndicatorConfigStore {
        &self.indicator_store
    }

    /// A new chart view bound to this context's caches and stored settings.
    pub fn chart_session(&self) -> ChartSession {
        ChartSession::new(Arc::clone(&self.bundle_loader), Arc::clone(&self.history))
            .with_config_store(self.indicator_store.clone())
    }

    pub async fn cache_status(&self) -> Vec<CacheStatus> {
        vec![
            status(
                self.bundles.store().as_ref(),
                self.bundles.memory_keys().len(),
                self.bundles.capacity(),
            )
            .await,
            status(
                self.orders.store().as_ref(),
                self.orders.memory_keys().len(),
                self.orders.capacity(),
            )
            .await,
        ]
    }

    /// Empty both tiers of both domains. Returns (store, rows removed).
    pub async fn clear_caches(&self) -> Vec<(String, Option<usize>)> {
        self.bundles.clear_memory();
        self.orders.clear_memory();
        let mut removed = Vec::new();
        for store in [self.bundles.store(), self.orders.store()] {
            let n = match store.clear().await {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(store = %store.name(), error = %e, "could not clear persistent store");
                    None
                }
            };
            removed.push((store.name().to_string(), n));
        }
        removed
    }
}

async fn status(
    store: &dyn PersistentStore,
    memory_entries: usize,
    capacity: TierCapacity,
) -> CacheStatus {
    let rows = match store.list().await {
        Ok(rows) => Some(rows),
        Err(e) => {
            warn!(store = %store.name(), error = %e, "could not list persistent store");
            None
        }
    };
    CacheStatus {
        store: store.name().to_string(),
        memory_entries,
        capacity: (capacity.memory, capacity.persistent),
        persistent_rows: rows.as_ref().map(Vec::len),
        newest_saved_at: rows.and_then(|r| r.iter().map(|m| m.saved_at).max()),
    }
}
