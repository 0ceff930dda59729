//! Historical candle types.

use serde::{Deserialize, Serialize};

/// One historical candle as returned by `/api/candles`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CandleDto {
    /// Bucket start (unix seconds).
    pub time: i64,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume.
    #[serde(default)]
    pub volume: f64,
}

/// Response body of the candles endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CandlesResponse {
    /// Candles, in any order. A missing or null field means no data.
    #[serde(default)]
    pub data: Option<Vec<CandleDto>>,
}

impl CandlesResponse {
    /// Consume the response, returning candles sorted by time ascending.
    pub fn into_sorted(self) -> Vec<CandleDto> {
        let mut data = self.data.unwrap_or_default();
        data.sort_by_key(|c| c.time);
        data
    }
}
