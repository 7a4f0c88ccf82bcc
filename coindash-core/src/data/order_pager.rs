//! Market-order pager: walks the cursor-paginated listing to exhaustion.

use super::provider::{DataError, OrderPageSource};
use crate::domain::{OrderEntry, OrderQuery};
use tracing::{debug, warn};

/// Hard ceiling on page requests per listing.
///
/// Guarantees termination against a server that never stops returning a
/// cursor. A universe larger than `MAX_ORDER_PAGES * limit` is truncated.
pub const MAX_ORDER_PAGES: usize = 500;

pub const DEFAULT_PAGE_LIMIT: usize = 200;
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Fetch every page for `query` and flatten the symbols in server order.
///
/// Symbols are trimmed and upper-cased; empty strings are dropped. Stops on a
/// missing `cursor_next`, an empty page, or after `MAX_ORDER_PAGES` requests.
/// `saved_at` is the last page's `server_time_ms`, else wall-clock time.
pub async fn fetch_order_all(
    source: &dyn OrderPageSource,
    query: &OrderQuery,
    page_limit: Option<usize>,
) -> Result<OrderEntry, DataError> {
    let limit = page_limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);

    let mut order: Vec<String> = Vec::new();
    let mut cursor = 0u64;
    let mut server_time: Option<i64> = None;
    let mut pages = 0usize;

    loop {
        if pages >= MAX_ORDER_PAGES {
            warn!(
                key = %query.cache_key(),
                pages,
                symbols = order.len(),
                "market order listing hit the page ceiling; result truncated"
            );
            break;
        }

        let page = source.fetch_order_page(query, cursor, limit).await?;
        pages += 1;
        if page.server_time_ms.is_some() {
            server_time = page.server_time_ms;
        }

        let page_len = page.order.len();
        order.extend(
            page.order
                .into_iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty()),
        );

        match page.cursor_next {
            Some(next) if page_len > 0 => cursor = next,
            _ => break,
        }
    }

    debug!(key = %query.cache_key(), pages, symbols = order.len(), "market order listing complete");

    Ok(OrderEntry {
        saved_at: server_time.unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
        order,
    })
}
