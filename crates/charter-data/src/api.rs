//! REST-backed history source.

use async_trait::async_trait;
use chart_api::{CandleDto, ChartClient};
use charter_core::{Bar, SeriesKey};

use crate::error::{Error, Result};
use crate::source::HistorySource;

/// Convert a REST candle into a core bar.
pub fn candle_to_bar(candle: &CandleDto) -> Bar {
    Bar::new(
        candle.time,
        candle.open,
        candle.high,
        candle.low,
        candle.close,
        candle.volume,
    )
}

/// Serves history pages from the `/api/candles` endpoint.
#[derive(Debug, Clone)]
pub struct ApiSource {
    client: ChartClient,
}

impl ApiSource {
    pub fn new(client: ChartClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HistorySource for ApiSource {
    async fn fetch_page(
        &self,
        key: &SeriesKey,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Bar>> {
        let candles = self
            .client
            .candles(&key.instrument, key.timeframe.label(), limit, before)
            .await
            .map_err(|source| Error::FetchFailed {
                key: key.clone(),
                source,
            })?;

        log::debug!(
            "fetch_page({}): before={:?}, got {} candles",
            key,
            before,
            candles.len()
        );

        Ok(candles.iter().map(candle_to_bar).collect())
    }
}
