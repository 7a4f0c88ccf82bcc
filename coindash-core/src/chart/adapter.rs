//! Chart rendering adapter.
//!
//! Drives a [`ChartSurface`] (the charting widget) through its lifecycle and
//! decides when the visible range is close enough to the loaded boundary to
//! ask for an older page.

use super::series::CandleSeries;
use crate::data::HistoryRequest;
use crate::domain::{BundleKey, Candle};
use crate::indicator_config::ChartIndicatorConfigV1;
use crate::indicators::{compute_indicators, IndicatorOutput, SeriesPoint};
use tracing::debug;

/// Bars from the left edge at which an older page is requested.
pub const LOAD_MORE_THRESHOLD: usize = 20;

/// Candles asked for per history page.
pub const HISTORY_PAGE_LIMIT: usize = 500;

const OVERLAYS: [&str; 3] = ["bb_mid", "bb_upper", "bb_lower"];

/// The widget side of the chart.
pub trait ChartSurface {
    fn create(&mut self, width: u32, height: u32);
    fn set_candles(&mut self, candles: &[Candle]);
    fn set_overlay(&mut self, name: &str, points: &[SeriesPoint]);
    fn set_pane(&mut self, name: &str, points: &[SeriesPoint]);
    fn clear_series(&mut self, name: &str);
    fn resize(&mut self, width: u32, height: u32);
    fn destroy(&mut self);
}

pub struct ChartAdapter<S: ChartSurface> {
    surface: S,
    mounted: bool,
    stopped: bool,
    size: (u32, u32),
    rendered_key: Option<BundleKey>,
    oldest_time: Option<i64>,
    history_in_flight: bool,
    history_exhausted: bool,
}

impl<S: ChartSurface> ChartAdapter<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            mounted: false,
            stopped: false,
            size: (0, 0),
            rendered_key: None,
            oldest_time: None,
            history_in_flight: false,
            history_exhausted: false,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted && !self.stopped
    }

    pub fn history_exhausted(&self) -> bool {
        self.history_exhausted
    }

    pub fn mount(&mut self, width: u32, height: u32) {
        if self.stopped || self.mounted {
            return;
        }
        self.surface.create(width, height);
        self.size = (width, height);
        self.mounted = true;
    }

    /// Paint candles and every indicator `config` enables; clear the rest.
    ///
    /// Returns the computed indicators, or `None` when not mounted.
    pub fn render(
        &mut self,
        series: &CandleSeries,
        config: &ChartIndicatorConfigV1,
    ) -> Option<IndicatorOutput> {
        if !self.is_mounted() {
            return None;
        }
        if self.rendered_key.as_ref() != Some(series.key()) {
            self.rendered_key = Some(series.key().clone());
            self.history_in_flight = false;
            self.history_exhausted = false;
        }
        self.oldest_time = series.oldest_time();

        let output = compute_indicators(series.candles(), config);
        self.surface.set_candles(series.candles());
        for (name, points) in output.named_series() {
            if !enabled(name, config) {
                self.surface.clear_series(name);
            } else if OVERLAYS.contains(&name) {
                self.surface.set_overlay(name, points);
            } else {
                self.surface.set_pane(name, points);
            }
        }
        Some(output)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if !self.is_mounted() || width == 0 || height == 0 || (width, height) == self.size {
            return;
        }
        self.size = (width, height);
        self.surface.resize(width, height);
    }

    /// Called when the leftmost visible bar index changes.
    pub fn on_visible_range(&mut self, from_index: usize) -> Option<HistoryRequest> {
        if !self.is_mounted()
            || from_index > LOAD_MORE_THRESHOLD
            || self.history_in_flight
            || self.history_exhausted
        {
            return None;
        }
        let before = self.oldest_time?;
        self.history_in_flight = true;
        debug!(from_index, before, "requesting older candles");
        Some(HistoryRequest {
            before,
            limit: HISTORY_PAGE_LIMIT,
        })
    }

    /// Report the result of the last history request. An empty page means
    /// there is nothing older.
    pub fn complete_history(&mut self, page_len: usize) {
        self.history_in_flight = false;
        if page_len == 0 {
            self.history_exhausted = true;
        }
    }

    pub fn teardown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if self.mounted {
            self.surface.destroy();
        }
    }
}

fn enabled(name: &str, config: &ChartIndicatorConfigV1) -> bool {
    match name {
        "bb_mid" | "bb_upper" | "bb_lower" => config.overlays.bollinger.enabled,
        "volume" => config.panes.volume,
        "rsi" => config.panes.rsi.enabled,
        "macd" | "macd_signal" | "macd_histogram" => config.panes.macd.enabled,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSurface {
        calls: Vec<String>,
    }

    impl ChartSurface for RecordingSurface {
        fn create(&mut self, width: u32, height: u32) {
            self.calls.push(format!("create {width}x{height}"));
        }
        fn set_candles(&mut self, candles: &[Candle]) {
            self.calls.push(format!("candles {}", candles.len()));
        }
        fn set_overlay(&mut self, name: &str, points: &[SeriesPoint]) {
            self.calls.push(format!("overlay {name} {}", points.len()));
        }
        fn set_pane(&mut self, name: &str, points: &[SeriesPoint]) {
            self.calls.push(format!("pane {name} {}", points.len()));
        }
        fn clear_series(&mut self, name: &str) {
            self.calls.push(format!("clear {name}"));
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.calls.push(format!("resize {width}x{height}"));
        }
        fn destroy(&mut self) {
            self.calls.push("destroy".into());
        }
    }

    fn series(symbol: &str, n: usize) -> CandleSeries {
        let candles = (0..n)
            .map(|i| Candle {
                time: 1_000 + i as i64,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.0 + i as f64,
                volume: 3.0,
            })
            .collect();
        CandleSeries::new(BundleKey::new("spot", symbol, Some("1h")), candles)
    }

    fn mounted() -> ChartAdapter<RecordingSurface> {
        let mut a = ChartAdapter::new(RecordingSurface::default());
        a.mount(800, 600);
        a
    }

    #[test]
    fn render_paints_enabled_and_clears_disabled() {
        let mut a = mounted();
        let mut cfg = ChartIndicatorConfigV1::default();
        cfg.overlays.bollinger.enabled = true;
        cfg.overlays.bollinger.n = 3;

        let out = a.render(&series("BTC", 5), &cfg).unwrap();
        assert_eq!(out.bb_mid.len(), 3);
        assert_eq!(
            a.surface().calls,
            vec![
                "create 800x600",
                "candles 5",
                "overlay bb_mid 3",
                "overlay bb_upper 3",
                "overlay bb_lower 3",
                "pane volume 5",
                "clear rsi",
                "clear macd",
                "clear macd_signal",
                "clear macd_histogram",
            ]
        );
    }

    #[test]
    fn nothing_happens_before_mount_or_after_teardown() {
        let mut a = ChartAdapter::new(RecordingSurface::default());
        assert!(a.render(&series("BTC", 3), &ChartIndicatorConfigV1::default()).is_none());

        a.mount(10, 10);
        a.teardown();
        a.teardown();
        assert!(a.render(&series("BTC", 3), &ChartIndicatorConfigV1::default()).is_none());
        a.resize(20, 20);
        a.mount(10, 10);
        assert_eq!(a.surface().calls, vec!["create 10x10", "destroy"]);
    }

    #[test]
    fn zero_and_unchanged_resizes_are_ignored() {
        let mut a = mounted();
        a.resize(0, 100);
        a.resize(800, 600);
        a.resize(1024, 768);
        assert_eq!(a.surface().calls, vec!["create 800x600", "resize 1024x768"]);
    }

    #[test]
    fn requests_history_near_left_edge_once() {
        let mut a = mounted();
        a.render(&series("BTC", 50), &ChartIndicatorConfigV1::default());

        assert_eq!(a.on_visible_range(LOAD_MORE_THRESHOLD + 1), None);
        let req = a.on_visible_range(5).unwrap();
        assert_eq!(req.before, 1_000);
        assert_eq!(req.limit, HISTORY_PAGE_LIMIT);
        // in flight
        assert_eq!(a.on_visible_range(0), None);

        a.complete_history(100);
        assert!(a.on_visible_range(0).is_some());
        a.complete_history(0);
        assert!(a.history_exhausted());
        assert_eq!(a.on_visible_range(0), None);
    }

    #[test]
    fn new_symbol_resets_history_state() {
        let mut a = mounted();
        let cfg = ChartIndicatorConfigV1::default();
        a.render(&series("BTC", 30), &cfg);
        a.on_visible_range(0);
        a.complete_history(0);
        assert!(a.history_exhausted());

        a.render(&series("ETH", 30), &cfg);
        assert!(!a.history_exhausted());
        assert!(a.on_visible_range(0).is_some());
    }

    #[test]
    fn empty_series_never_requests_history() {
        let mut a = mounted();
        a.render(&series("BTC", 0), &ChartIndicatorConfigV1::default());
        assert_eq!(a.on_visible_range(0), None);
    }
}
