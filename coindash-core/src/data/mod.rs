//! Chart backend access: wire codec, HTTP client, and the market-order pager

pub mod codec;
pub mod http;
pub mod order_pager;
pub mod provider;

pub use codec::{decode_bundle_bytes, decode_bundle_json, encode_bundle, is_msgpack};
pub use http::HttpApi;
pub use order_pager::{fetch_order_all, MAX_ORDER_PAGES};
pub use provider::{
    BundlePayload, BundleSource, DataError, Headers, HistoryRequest, HistorySource, OrderPage,
    OrderPageSource,
};
