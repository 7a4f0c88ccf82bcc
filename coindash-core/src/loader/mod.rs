//! Cache-backed loaders tying the data sources to the cache tiers

pub mod bundle;
pub mod market_order;

pub use bundle::{BundleLoader, LoadedBundle};
pub use market_order::{LoadedOrder, MarketOrderCache};
