//! HTTP client for the chart backend.
//!
//! Thin wrapper over `reqwest`: builds the bundle, history and market-order
//! requests, negotiates MessagePack over JSON, and maps non-2xx statuses to the
//! coarse `*_http_<status>` error codes. No retries happen here; callers wrap
//! calls in `Backoff::retry` when they want them.

use super::codec::BUNDLE_ACCEPT;
use super::provider::{
    BundlePayload, BundleSource, DataError, Headers, HistoryRequest, HistorySource, OrderPage,
    OrderPageSource,
};
use crate::domain::{BundleKey, OrderQuery};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use std::time::Duration;
use tracing::{debug, info};

/// Chart backend client.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    api_base: String,
}

impl HttpApi {
    pub fn new(
        api_base: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, DataError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| DataError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, api_base))
    }

    pub fn with_client(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// `{api_base}/chart/bundle?market=&symbol=&tf=` plus optional history params.
    pub fn bundle_url(
        &self,
        key: &BundleKey,
        history: Option<HistoryRequest>,
    ) -> Result<String, DataError> {
        let mut params: Vec<(&str, String)> = vec![
            ("market", key.market.clone()),
            ("symbol", key.symbol.clone()),
        ];
        if let Some(tf) = &key.timeframe {
            params.push(("tf", tf.clone()));
        }
        if let Some(h) = history {
            params.push(("before", h.before.to_string()));
            params.push(("limit", h.limit.to_string()));
        }
        self.endpoint("chart/bundle", &params)
    }

    /// `{api_base}/market/order?market=&scope=&sort=&order=&window=&limit=&cursor=[&q=]`
    pub fn order_url(
        &self,
        query: &OrderQuery,
        cursor: u64,
        limit: usize,
    ) -> Result<String, DataError> {
        let mut params: Vec<(&str, String)> = vec![
            ("market", query.market.clone()),
            ("scope", query.scope.clone()),
            ("sort", query.sort.clone()),
            ("order", query.order.clone()),
            ("window", query.window.clone()),
            ("limit", limit.to_string()),
            ("cursor", cursor.to_string()),
        ];
        if let Some(q) = &query.query {
            params.push(("q", q.clone()));
        }
        self.endpoint("market/order", &params)
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<String, DataError> {
        Url::parse_with_params(&format!("{}/{path}", self.api_base), params)
            .map(|url| url.to_string())
            .map_err(|e| DataError::InvalidRequest(format!("bad {path} url: {e}")))
    }

    async fn get_bundle(
        &self,
        url: String,
        headers: Option<&Headers>,
    ) -> Result<BundlePayload, DataError> {
        let mut req = self.client.get(&url).header(ACCEPT, BUNDLE_ACCEPT);
        if let Some(extra) = headers {
            for (name, value) in extra {
                req = req.header(name.as_str(), value.as_str());
            }
        }

        let resp = req.send().await.map_err(network_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::bundle_http(status.as_u16()));
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();
        let body = resp.bytes().await.map_err(network_error)?;
        debug!(%url, %content_type, len = body.len(), "bundle response");

        BundlePayload::from_response(&content_type, body.to_vec())
    }
}

#[async_trait]
impl BundleSource for HttpApi {
    async fn fetch_bundle(
        &self,
        key: &BundleKey,
        headers: Option<&Headers>,
    ) -> Result<BundlePayload, DataError> {
        info!(key = %key, "fetching bundle");
        self.get_bundle(self.bundle_url(key, None)?, headers).await
    }
}

#[async_trait]
impl HistorySource for HttpApi {
    async fn fetch_history(
        &self,
        key: &BundleKey,
        request: HistoryRequest,
    ) -> Result<BundlePayload, DataError> {
        if key.timeframe.is_none() {
            return Err(DataError::InvalidRequest(
                "history requires a timeframe".into(),
            ));
        }
        info!(key = %key, before = request.before, "fetching history page");
        self.get_bundle(self.bundle_url(key, Some(request))?, None)
            .await
    }
}

#[async_trait]
impl OrderPageSource for HttpApi {
    async fn fetch_order_page(
        &self,
        query: &OrderQuery,
        cursor: u64,
        limit: usize,
    ) -> Result<OrderPage, DataError> {
        let url = self.order_url(query, cursor, limit)?;
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(network_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::market_order_http(status.as_u16()));
        }
        let body = resp.bytes().await.map_err(network_error)?;
        serde_json::from_slice(&body)
            .map_err(|e| DataError::Decode(format!("market order page: {e}")))
    }
}

fn network_error(e: reqwest::Error) -> DataError {
    DataError::Network(e.to_string())
}
