//! Core types for the charter application.
//!
//! This crate provides fundamental data structures with no external dependencies:
//! - `Bar` / `Tick` - OHLCV bar data and single price observations
//! - `Timeframe` - Bucket widths and bucket-boundary arithmetic
//! - `SeriesStore` - Ordered, de-duplicated bar series for one `SeriesKey`

pub mod candle;
pub mod series;
pub mod timeframe;

pub use candle::{Bar, Tick};
pub use series::{MergeSummary, SeriesKey, SeriesStore, StaleTick, TickOutcome};
pub use timeframe::{bucket_start, InvalidTimeframe, Timeframe};
