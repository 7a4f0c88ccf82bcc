//! Bundle: a multi-timeframe OHLCV snapshot for one symbol.

use super::candle::{normalize_candles, Candle, RawCandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Snapshot returned by the chart bundle endpoint.
///
/// `items` maps a timeframe string (e.g. `"1m"`, `"1h"`) to the raw candle rows
/// for that timeframe. `temp` carries server-side extras the pipeline passes
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub market: String,
    pub symbol: String,
    #[serde(default)]
    pub now: i64,
    #[serde(default)]
    pub items: BTreeMap<String, Vec<RawCandle>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<BTreeMap<String, serde_json::Value>>,
}

impl Bundle {
    pub fn new(market: impl Into<String>, symbol: impl Into<String>, now: i64) -> Self {
        Self {
            market: market.into(),
            symbol: symbol.into(),
            now,
            items: BTreeMap::new(),
            temp: None,
        }
    }

    /// Timeframes present in the bundle, in key order.
    pub fn timeframes(&self) -> Vec<&str> {
        self.items.keys().map(|s| s.as_str()).collect()
    }

    /// Normalized candles for a timeframe (empty when the timeframe is absent).
    pub fn candles(&self, timeframe: &str) -> Vec<Candle> {
        self.items
            .get(timeframe)
            .map(|rows| normalize_candles(rows))
            .unwrap_or_default()
    }

    /// Replace a timeframe with already-normalized candles.
    pub fn with_candles(mut self, timeframe: impl Into<String>, candles: &[Candle]) -> Self {
        self.items
            .insert(timeframe.into(), candles.iter().map(RawCandle::row).collect());
        self
    }
}

/// Identity of a bundle request: (market, symbol, timeframe).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BundleKey {
    pub market: String,
    pub symbol: String,
    pub timeframe: Option<String>,
}

impl BundleKey {
    /// Market is lower-cased, symbol upper-cased, both trimmed.
    pub fn new(market: &str, symbol: &str, timeframe: Option<&str>) -> Self {
        Self {
            market: market.trim().to_lowercase(),
            symbol: symbol.trim().to_uppercase(),
            timeframe: timeframe
                .map(str::trim)
                .filter(|tf| !tf.is_empty())
                .map(String::from),
        }
    }

    /// Composite cache key; `*` stands for "all timeframes".
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.market,
            self.symbol,
            self.timeframe.as_deref().unwrap_or("*")
        )
    }
}

impl fmt::Display for BundleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalizes_case_and_whitespace() {
        let key = BundleKey::new(" Spot ", "btcusdt ", Some("1h"));
        assert_eq!(key.cache_key(), "spot|BTCUSDT|1h");
    }

    #[test]
    fn key_without_timeframe_never_collides_with_one() {
        let all = BundleKey::new("spot", "BTCUSDT", None);
        let empty = BundleKey::new("spot", "BTCUSDT", Some("  "));
        let hourly = BundleKey::new("spot", "BTCUSDT", Some("1h"));
        assert_eq!(all.cache_key(), "spot|BTCUSDT|*");
        assert_eq!(all, empty);
        assert_ne!(all.cache_key(), hourly.cache_key());
    }

    #[test]
    fn candles_for_missing_timeframe_is_empty() {
        let bundle = Bundle::new("spot", "BTCUSDT", 0);
        assert!(bundle.candles("1d").is_empty());
    }

    #[test]
    fn with_candles_roundtrips_through_normalization() {
        let candles = vec![
            Candle { time: 1, open: 1.0, high: 2.0, low: 0.5, close: 1.5, volume: 3.0 },
            Candle { time: 2, open: 1.5, high: 2.5, low: 1.0, close: 2.0, volume: 4.0 },
        ];
        let bundle = Bundle::new("spot", "BTCUSDT", 10).with_candles("1m", &candles);
        assert_eq!(bundle.candles("1m"), candles);
        assert_eq!(bundle.timeframes(), vec!["1m"]);
    }
}
