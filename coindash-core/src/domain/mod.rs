//! Domain types for the chart data pipeline

pub mod bundle;
pub mod candle;
pub mod market_order;

pub use bundle::{Bundle, BundleKey};
pub use candle::{normalize_candles, Candle, CandleFields, LooseNumber, RawCandle};
pub use market_order::{OrderEntry, OrderQuery};
