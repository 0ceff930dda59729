//! History source trait definition.

use async_trait::async_trait;
use charter_core::{Bar, SeriesKey};

use crate::error::Result;

/// Anything that can serve pages of historical bars.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Fetch up to `limit` bars for `key` older than `before` (or the most
    /// recent bars when `before` is `None`), in ascending order.
    async fn fetch_page(
        &self,
        key: &SeriesKey,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Bar>>;
}
