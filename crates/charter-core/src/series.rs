//! Ordered bar series for one (instrument, timeframe) key.

use std::fmt;

use crate::candle::{Bar, Tick};
use crate::timeframe::{bucket_start, Timeframe};

/// Identifies one independent time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub instrument: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(instrument: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.instrument, self.timeframe)
    }
}

/// Result of a `SeriesStore::merge_bars` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Bars whose start time was not yet present.
    pub inserted: usize,
    /// Bars that overwrote an existing bucket.
    pub replaced: usize,
}

impl MergeSummary {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.replaced == 0
    }
}

/// How a tick was folded into the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new bar was opened for the tick's bucket.
    Appended,
    /// The newest bar was updated in place.
    Updated,
}

/// A tick whose bucket lies before the newest bar. Nothing was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleTick {
    pub bucket: i64,
    pub newest: i64,
}

impl fmt::Display for StaleTick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stale tick: bucket {} is older than newest bar {}",
            self.bucket, self.newest
        )
    }
}

impl std::error::Error for StaleTick {}

/// Strictly time-ascending, start-time-unique bars for exactly one key.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    key: SeriesKey,
    bars: Vec<Bar>,
}

impl SeriesStore {
    /// Creates an empty store for `key`.
    pub fn new(key: SeriesKey) -> Self {
        Self {
            key,
            bars: Vec::new(),
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// Inserts bars, overwriting any bar that shares a start time.
    ///
    /// Later bars in `new_bars` win over earlier ones with the same start
    /// time. Applying the same bars again leaves the store unchanged.
    pub fn merge_bars<I>(&mut self, new_bars: I) -> MergeSummary
    where
        I: IntoIterator<Item = Bar>,
    {
        let mut summary = MergeSummary::default();

        for bar in new_bars {
            // Appending to the tail is the common case for live data and
            // ascending pages, so check it before searching.
            match self.bars.last() {
                None => {
                    self.bars.push(bar);
                    summary.inserted += 1;
                    continue;
                }
                Some(last) if last.start_time < bar.start_time => {
                    self.bars.push(bar);
                    summary.inserted += 1;
                    continue;
                }
                _ => {}
            }

            match self
                .bars
                .binary_search_by_key(&bar.start_time, |b| b.start_time)
            {
                Ok(idx) => {
                    self.bars[idx] = bar;
                    summary.replaced += 1;
                }
                Err(idx) => {
                    self.bars.insert(idx, bar);
                    summary.inserted += 1;
                }
            }
        }

        summary
    }

    /// Folds a tick into the newest bar or opens a new one.
    ///
    /// Ticks that fall into a bucket before the newest bar are rejected and
    /// leave every bar untouched.
    pub fn apply_tick(
        &mut self,
        tick: &Tick,
        timeframe: Timeframe,
    ) -> Result<TickOutcome, StaleTick> {
        let bucket = bucket_start(tick.timestamp, timeframe);

        match self.bars.last_mut() {
            Some(last) if bucket == last.start_time => {
                last.absorb(tick.price, tick.volume);
                Ok(TickOutcome::Updated)
            }
            Some(last) if bucket < last.start_time => Err(StaleTick {
                bucket,
                newest: last.start_time,
            }),
            _ => {
                self.bars.push(Bar::from_price(bucket, tick.price, tick.volume));
                Ok(TickOutcome::Appended)
            }
        }
    }

    /// The current ordered sequence.
    pub fn snapshot(&self) -> &[Bar] {
        &self.bars
    }

    pub fn oldest_time(&self) -> Option<i64> {
        self.bars.first().map(|b| b.start_time)
    }

    pub fn newest_time(&self) -> Option<i64> {
        self.bars.last().map(|b| b.start_time)
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
