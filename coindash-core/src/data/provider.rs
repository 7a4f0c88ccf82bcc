//! Data source traits and structured error types.
//!
//! The source traits abstract over the chart backend so the loaders and caches
//! can be exercised against in-memory mocks. The HTTP implementation lives in
//! `data::http`; providers don't know about the cache layer above them.

use crate::domain::{Bundle, BundleKey, OrderQuery};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Structured error types for network and decode operations.
///
/// These are surfaced to callers, who own retry policy and user messaging.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// Non-2xx response. `code` is `bundle_http_<status>` or
    /// `market_order_http_<status>`.
    #[error("{code}")]
    Http { code: String, status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DataError {
    pub fn bundle_http(status: u16) -> Self {
        DataError::Http {
            code: format!("bundle_http_{status}"),
            status,
        }
    }

    pub fn market_order_http(status: u16) -> Self {
        DataError::Http {
            code: format!("market_order_http_{status}"),
            status,
        }
    }

    /// Worth retrying with backoff: transport failures, 408, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            DataError::Network(_) => true,
            DataError::Http { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

/// A fetched bundle plus the bytes it was decoded from.
///
/// `bytes` is always the MessagePack form, even when the server answered JSON.
#[derive(Debug, Clone)]
pub struct BundlePayload {
    pub bundle: Bundle,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Extra request headers forwarded to the backend.
pub type Headers = BTreeMap<String, String>;

/// Source of bundle snapshots.
#[async_trait]
pub trait BundleSource: Send + Sync {
    async fn fetch_bundle(
        &self,
        key: &BundleKey,
        headers: Option<&Headers>,
    ) -> Result<BundlePayload, DataError>;
}

/// One page of older candles for backward chart pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Exclusive upper bound (ms epoch).
    pub before: i64,
    pub limit: usize,
}

/// Source of older candles.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(
        &self,
        key: &BundleKey,
        request: HistoryRequest,
    ) -> Result<BundlePayload, DataError>;
}

/// One page from the cursor-paginated market-order endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPage {
    #[serde(default)]
    pub order: Vec<String>,
    #[serde(default)]
    pub cursor_next: Option<u64>,
    #[serde(default)]
    pub server_time_ms: Option<i64>,
}

/// Source of market-order pages.
#[async_trait]
pub trait OrderPageSource: Send + Sync {
    async fn fetch_order_page(
        &self,
        query: &OrderQuery,
        cursor: u64,
        limit: usize,
    ) -> Result<OrderPage, DataError>;
}
