//! Chart session: the observable state of one chart view.
//!
//! Loads go through the bundle loader, indicators are computed from the
//! active configuration, and the result is committed only if no newer load
//! (or `stop`) happened while it was in flight.

use super::guard::RequestGuard;
use crate::cache::entry::Origin;
use crate::chart::{CandleSeries, HISTORY_PAGE_LIMIT};
use crate::coherency::Subscription;
use crate::data::{DataError, HistoryRequest, HistorySource};
use crate::domain::BundleKey;
use crate::indicator_config::{ChartIndicatorConfigV1, IndicatorConfigStore};
use crate::indicators::{compute_indicators, IndicatorOutput};
use crate::loader::BundleLoader;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

/// What a chart shows once a load is committed.
#[derive(Debug, Clone)]
pub struct ChartView {
    pub key: BundleKey,
    pub candles: CandleSeries,
    pub indicators: IndicatorOutput,
    pub saved_at: i64,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The result is now the visible state; `candles` were added by it.
    Committed { candles: usize },
    /// A newer load or `stop` made this result stale; it was dropped.
    Superseded,
    /// There is no committed view to extend.
    NothingToLoad,
}

pub struct ChartSession {
    loader: Arc<BundleLoader>,
    history: Arc<dyn HistorySource>,
    config_store: Option<IndicatorConfigStore>,
    config: Mutex<ChartIndicatorConfigV1>,
    guard: RequestGuard,
    view: Mutex<Option<ChartView>>,
    listener: Mutex<Option<Subscription>>,
}

impl ChartSession {
    /// A session with the default indicator configuration. Starts listening
    /// for coherency announcements when a runtime is available.
    pub fn new(loader: Arc<BundleLoader>, history: Arc<dyn HistorySource>) -> Self {
        let listener = loader.listen();
        Self {
            loader,
            history,
            config_store: None,
            config: Mutex::new(ChartIndicatorConfigV1::default()),
            guard: RequestGuard::new(),
            view: Mutex::new(None),
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Load the stored indicator configuration and persist later changes.
    pub fn with_config_store(mut self, store: IndicatorConfigStore) -> Self {
        *self.config.get_mut() = store.load();
        self.config_store = Some(store);
        self
    }

    pub fn view(&self) -> Option<ChartView> {
        self.view.lock().clone()
    }

    pub fn indicator_config(&self) -> ChartIndicatorConfigV1 {
        self.config.lock().clone()
    }

    pub async fn load(
        &self,
        market: &str,
        symbol: &str,
        timeframe: &str,
    ) -> Result<LoadOutcome, DataError> {
        let ticket = self.guard.begin();
        let key = BundleKey::new(market, symbol, Some(timeframe));
        let loaded = self.loader.load(&key, None).await;
        if !ticket.is_current() {
            debug!(key = %key, "superseded load dropped");
            return Ok(LoadOutcome::Superseded);
        }
        let loaded = loaded?;

        let tf = key.timeframe.clone().unwrap_or_default();
        let series = CandleSeries::new(key.clone(), loaded.bundle().candles(&tf));
        let indicators = compute_indicators(series.candles(), &self.indicator_config());
        let candles = series.len();
        let view = ChartView {
            key,
            candles: series,
            indicators,
            saved_at: loaded.saved_at(),
            origin: loaded.origin,
        };

        let mut state = self.view.lock();
        if !ticket.is_current() {
            return Ok(LoadOutcome::Superseded);
        }
        info!(key = %view.key, candles, origin = %view.origin, "chart view committed");
        *state = Some(view);
        Ok(LoadOutcome::Committed { candles })
    }

    /// Fetch one page older than the committed view and merge it.
    pub async fn load_older(&self) -> Result<LoadOutcome, DataError> {
        let before = self.view.lock().as_ref().and_then(|v| v.candles.oldest_time());
        match before {
            Some(before) => {
                self.load_history(HistoryRequest {
                    before,
                    limit: HISTORY_PAGE_LIMIT,
                })
                .await
            }
            None => Ok(LoadOutcome::NothingToLoad),
        }
    }

    pub async fn load_history(&self, request: HistoryRequest) -> Result<LoadOutcome, DataError> {
        let ticket = self.guard.current();
        let Some(key) = self.view.lock().as_ref().map(|v| v.key.clone()) else {
            return Ok(LoadOutcome::NothingToLoad);
        };
        let Some(tf) = key.timeframe.clone() else {
            return Ok(LoadOutcome::NothingToLoad);
        };

        let page = self.history.fetch_history(&key, request).await;
        if !ticket.is_current() {
            return Ok(LoadOutcome::Superseded);
        }
        let page = page?.bundle.candles(&tf);
        let config = self.indicator_config();

        let mut state = self.view.lock();
        if !ticket.is_current() {
            return Ok(LoadOutcome::Superseded);
        }
        let Some(view) = state.as_mut().filter(|v| v.key == key) else {
            return Ok(LoadOutcome::Superseded);
        };
        let added = view.candles.merge_older(&page);
        if added > 0 {
            view.indicators = compute_indicators(view.candles.candles(), &config);
        }
        debug!(key = %key, before = request.before, added, "history page merged");
        Ok(LoadOutcome::Committed { candles: added })
    }

    /// Re-fetch the committed view's bundle and append bars newer than the
    /// loaded range. The live bar is replaced in place; older history stays.
    pub async fn refresh(&self) -> Result<LoadOutcome, DataError> {
        let ticket = self.guard.current();
        let Some(key) = self.view.lock().as_ref().map(|v| v.key.clone()) else {
            return Ok(LoadOutcome::NothingToLoad);
        };
        let tf = key.timeframe.clone().unwrap_or_default();

        let loaded = self.loader.refresh(&key, None).await;
        if !ticket.is_current() {
            return Ok(LoadOutcome::Superseded);
        }
        let loaded = loaded?;
        let page = loaded.bundle().candles(&tf);
        let config = self.indicator_config();

        let mut state = self.view.lock();
        if !ticket.is_current() {
            return Ok(LoadOutcome::Superseded);
        }
        let Some(view) = state.as_mut().filter(|v| v.key == key) else {
            return Ok(LoadOutcome::Superseded);
        };
        let added = view.candles.merge_newer(&page);
        view.indicators = compute_indicators(view.candles.candles(), &config);
        view.saved_at = loaded.saved_at();
        view.origin = loaded.origin;
        debug!(key = %key, added, "chart view refreshed");
        Ok(LoadOutcome::Committed { candles: added })
    }

    /// Sanitize, apply to the committed view, and persist.
    ///
    /// The new configuration is active even when persisting fails.
    pub fn set_indicator_config(
        &self,
        config: &ChartIndicatorConfigV1,
    ) -> io::Result<ChartIndicatorConfigV1> {
        let clean = config.sanitized();
        *self.config.lock() = clean.clone();
        if let Some(view) = self.view.lock().as_mut() {
            view.indicators = compute_indicators(view.candles.candles(), &clean);
        }
        match &self.config_store {
            Some(store) => store.save(&clean),
            None => Ok(clean),
        }
    }

    /// Every pending continuation becomes a no-op.
    pub fn stop(&self) {
        self.guard.stop();
        self.listener.lock().take();
    }

    pub fn is_stopped(&self) -> bool {
        self.guard.is_stopped()
    }
}
