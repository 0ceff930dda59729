//! Bar and tick data structures for OHLCV data.

/// OHLCV bar covering one timeframe bucket.
///
/// `start_time` is the bucket start in unix seconds and is the bar's identity
/// inside a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub start_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(start_time: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            start_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Opens a new bar from a single trade price.
    pub fn from_price(start_time: i64, price: f64, volume: f64) -> Self {
        Self::new(start_time, price, price, price, price, volume)
    }

    /// Folds a trade into this bar.
    pub fn absorb(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    /// Whether the close is at or above the open.
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }
}

/// A single trade/price observation. Never stored, only folded into a `Bar`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub instrument: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub price: f64,
    pub volume: f64,
}

impl Tick {
    pub fn new(instrument: impl Into<String>, timestamp: i64, price: f64, volume: f64) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            price,
            volume,
        }
    }
}
