//! CoinDash core: the chart data pipeline.
//!
//! - Bundle snapshots: MessagePack/JSON decoding and the HTTP client
//! - Two-tier caches (memory LRU + persistent store) for bundles and
//!   market-order lists, with cross-context coherency announcements
//! - Cursor pager for the market-order listing
//! - Indicator engine (EMA, Wilder RSI, MACD, Bollinger Bands) and its
//!   versioned configuration
//! - Chart sessions with stale-result discard, the widget adapter, and
//!   caller-side retry backoff

pub mod backoff;
pub mod cache;
pub mod chart;
pub mod coherency;
pub mod config;
pub mod data;
pub mod domain;
pub mod indicator_config;
pub mod indicators;
pub mod loader;
pub mod session;
