//! Market-order lists: the sorted symbol universe used for chart navigation.

use serde::{Deserialize, Serialize};

/// Every dimension that shapes a market-order listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderQuery {
    pub market: String,
    pub scope: String,
    pub window: String,
    pub sort: String,
    pub order: String,
    pub query: Option<String>,
}

impl OrderQuery {
    pub fn new(market: &str, scope: &str, window: &str, sort: &str, order: &str) -> Self {
        Self {
            market: market.trim().to_lowercase(),
            scope: scope.trim().to_string(),
            window: window.trim().to_string(),
            sort: sort.trim().to_string(),
            order: order.trim().to_lowercase(),
            query: None,
        }
    }

    /// Free-text filter; blank strings mean no filter.
    pub fn with_query(mut self, query: Option<&str>) -> Self {
        self.query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(String::from);
        self
    }

    /// `market|scope|window|sort|order|query`
    pub fn cache_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.market,
            self.scope,
            self.window,
            self.sort,
            self.order,
            self.query.as_deref().unwrap_or("")
        )
    }
}

/// A fully paginated, flattened symbol list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEntry {
    pub saved_at: i64,
    pub order: Vec<String>,
}

impl OrderEntry {
    /// Previous and next symbol around `symbol`, wrapping at both ends.
    ///
    /// `None` when the symbol is absent or there is nothing to move to.
    pub fn neighbors(&self, symbol: &str) -> Option<(String, String)> {
        let n = self.order.len();
        if n < 2 {
            return None;
        }
        let needle = symbol.trim().to_uppercase();
        let idx = self.order.iter().position(|s| *s == needle)?;
        let prev = &self.order[(idx + n - 1) % n];
        let next = &self.order[(idx + 1) % n];
        Some((prev.clone(), next.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_shapes_get_distinct_keys() {
        let base = OrderQuery::new("spot", "all", "24h", "volume", "desc");
        let asc = OrderQuery::new("spot", "all", "24h", "volume", "asc");
        let filtered = base.clone().with_query(Some("btc"));
        assert_eq!(base.cache_key(), "spot|all|24h|volume|desc|");
        assert_ne!(base.cache_key(), asc.cache_key());
        assert_eq!(filtered.cache_key(), "spot|all|24h|volume|desc|btc");
    }

    #[test]
    fn blank_query_is_no_query() {
        let q = OrderQuery::new("spot", "all", "24h", "volume", "desc").with_query(Some("  "));
        assert_eq!(q.query, None);
    }

    #[test]
    fn neighbors_wrap() {
        let entry = OrderEntry {
            saved_at: 0,
            order: vec!["BTC".into(), "ETH".into(), "SOL".into()],
        };
        assert_eq!(entry.neighbors("btc"), Some(("SOL".into(), "ETH".into())));
        assert_eq!(entry.neighbors("SOL"), Some(("ETH".into(), "BTC".into())));
        assert_eq!(entry.neighbors("DOGE"), None);
    }

    #[test]
    fn neighbors_need_two_symbols() {
        let entry = OrderEntry { saved_at: 0, order: vec!["BTC".into()] };
        assert_eq!(entry.neighbors("BTC"), None);
    }
}
