//! Applies live stream messages to the active series.

use chart_api::StreamMessage;
use charter_core::{Bar, MergeSummary, SeriesKey, SeriesStore, Tick, TickOutcome, Timeframe};

use crate::error::{Error, Result};
use crate::validation::{validate_bar, validate_tick, validate_timestamp};

/// What a live message did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The message belongs to another series.
    Ignored,
    /// A completed candle replaced or inserted its bucket.
    Candle(MergeSummary),
    /// A tick was folded into the newest bar.
    Tick(TickOutcome),
}

impl IngestOutcome {
    /// Whether the store changed.
    pub fn changed(&self) -> bool {
        match self {
            IngestOutcome::Ignored => false,
            IngestOutcome::Candle(summary) => !summary.is_empty(),
            IngestOutcome::Tick(_) => true,
        }
    }
}

/// Live ingest bound to one series key.
#[derive(Debug, Clone)]
pub struct LiveIngest {
    key: SeriesKey,
}

impl LiveIngest {
    pub fn new(key: SeriesKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// Apply one stream message to `store`.
    ///
    /// Candles for this key replace their bucket wholesale; ticks for this
    /// instrument go through `apply_tick`. Anything else is ignored.
    pub fn apply(&self, store: &mut SeriesStore, message: &StreamMessage) -> Result<IngestOutcome> {
        debug_assert_eq!(store.key(), &self.key);

        if message.symbol() != self.key.instrument {
            return Ok(IngestOutcome::Ignored);
        }

        match message {
            StreamMessage::Candle {
                timeframe, candle, ..
            } => {
                let timeframe: Timeframe = timeframe.parse().map_err(|_| {
                    Error::MalformedMessage(format!("candle with unknown timeframe {timeframe:?}"))
                })?;
                if timeframe != self.key.timeframe {
                    return Ok(IngestOutcome::Ignored);
                }
                if !validate_timestamp(candle.start_time) {
                    return Err(Error::MalformedMessage(format!(
                        "candle for {} with out of range start time {}",
                        self.key, candle.start_time
                    )));
                }

                let bar = Bar::new(
                    timeframe.bucket_start(candle.start_time),
                    candle.open,
                    candle.high,
                    candle.low,
                    candle.close,
                    candle.volume,
                );
                if !validate_bar(&bar) {
                    return Err(Error::MalformedMessage(format!(
                        "invalid candle for {} at {}",
                        self.key, candle.start_time
                    )));
                }

                Ok(IngestOutcome::Candle(store.merge_bars([bar])))
            }
            StreamMessage::Tick {
                symbol,
                timestamp,
                price,
                volume,
            } => {
                let volume = volume.unwrap_or(0.0);
                if !validate_tick(*timestamp, *price, volume) {
                    return Err(Error::MalformedMessage(format!(
                        "invalid tick for {symbol} at {timestamp}: price={price}, volume={volume}"
                    )));
                }

                let tick = Tick::new(symbol.as_str(), *timestamp, *price, volume);
                let outcome = store.apply_tick(&tick, self.key.timeframe)?;
                Ok(IngestOutcome::Tick(outcome))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_api::types::Frame;
    use chart_api::StreamCandle;

    fn key() -> SeriesKey {
        SeriesKey::new("BTC/USD", Timeframe::Min1)
    }

    fn tick(symbol: &str, timestamp: i64, price: f64, volume: Option<f64>) -> StreamMessage {
        StreamMessage::Tick {
            symbol: symbol.into(),
            timestamp,
            price,
            volume,
        }
    }

    fn candle(symbol: &str, timeframe: &str, start_time: i64, close: f64) -> StreamMessage {
        StreamMessage::Candle {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            candle: StreamCandle {
                start_time,
                open: 10.0,
                high: close.max(12.0),
                low: close.min(9.0),
                close,
                volume: 100.0,
            },
        }
    }

    #[test]
    fn test_ticks_build_bars() {
        let ingest = LiveIngest::new(key());
        let mut store = SeriesStore::new(key());

        let first = ingest.apply(&mut store, &tick("BTC/USD", 125, 10.0, Some(1.0))).unwrap();
        let second = ingest.apply(&mut store, &tick("BTC/USD", 170, 11.0, None)).unwrap();
        let third = ingest.apply(&mut store, &tick("BTC/USD", 181, 9.5, Some(2.0))).unwrap();

        assert_eq!(first, IngestOutcome::Tick(TickOutcome::Appended));
        assert_eq!(second, IngestOutcome::Tick(TickOutcome::Updated));
        assert_eq!(third, IngestOutcome::Tick(TickOutcome::Appended));
        assert_eq!(
            store.snapshot(),
            &[
                Bar::new(120, 10.0, 11.0, 10.0, 11.0, 1.0),
                Bar::from_price(180, 9.5, 2.0),
            ]
        );
    }

    #[test]
    fn test_candle_replaces_tick_built_bar() {
        let ingest = LiveIngest::new(key());
        let mut store = SeriesStore::new(key());
        ingest.apply(&mut store, &tick("BTC/USD", 125, 50.0, Some(5.0))).unwrap();

        let outcome = ingest.apply(&mut store, &candle("BTC/USD", "1m", 120, 11.0)).unwrap();

        assert_eq!(
            outcome,
            IngestOutcome::Candle(MergeSummary {
                inserted: 0,
                replaced: 1
            })
        );
        assert_eq!(store.snapshot(), &[Bar::new(120, 10.0, 12.0, 9.0, 11.0, 100.0)]);
    }

    #[test]
    fn test_other_series_are_ignored() {
        let ingest = LiveIngest::new(key());
        let mut store = SeriesStore::new(key());

        let messages = [
            tick("SPY", 125, 10.0, Some(1.0)),
            candle("SPY", "1m", 120, 11.0),
            candle("BTC/USD", "5m", 0, 11.0),
            candle("SPY", "1d", 0, 11.0),
        ];
        for message in &messages {
            let outcome = ingest.apply(&mut store, message).unwrap();
            assert_eq!(outcome, IngestOutcome::Ignored);
            assert!(!outcome.changed());
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_unaligned_candle_is_bucketed() {
        let ingest = LiveIngest::new(key());
        let mut store = SeriesStore::new(key());

        ingest.apply(&mut store, &candle("BTC/USD", "1m", 150, 11.0)).unwrap();

        assert_eq!(store.newest_time(), Some(120));
    }

    #[test]
    fn test_malformed_messages() {
        let ingest = LiveIngest::new(key());
        let mut store = SeriesStore::new(key());

        let unknown_tf = ingest.apply(&mut store, &candle("BTC/USD", "1d", 0, 11.0));
        assert!(matches!(unknown_tf, Err(Error::MalformedMessage(_))));

        let mut bad = candle("BTC/USD", "1m", 0, 11.0);
        if let StreamMessage::Candle { candle, .. } = &mut bad {
            candle.high = 1.0;
        }
        assert!(matches!(ingest.apply(&mut store, &bad), Err(Error::MalformedMessage(_))));

        let nan = ingest.apply(&mut store, &tick("BTC/USD", 0, f64::NAN, None));
        assert!(matches!(nan, Err(Error::MalformedMessage(_))));

        let negative = ingest.apply(&mut store, &tick("BTC/USD", 0, 1.0, Some(-1.0)));
        assert!(matches!(negative, Err(Error::MalformedMessage(_))));

        assert!(store.is_empty());
    }

    #[test]
    fn test_out_of_range_timestamps_are_malformed() {
        let ingest = LiveIngest::new(key());
        let mut store = SeriesStore::new(key());
        ingest.apply(&mut store, &tick("BTC/USD", 125, 10.0, Some(1.0))).unwrap();

        let text = format!(
            r#"{{"type":"tick","symbol":"BTC/USD","timestamp":{},"price":1.0}}"#,
            i64::MIN
        );
        let Frame::Message(message) = Frame::parse(&text) else {
            panic!("tick frame should decode");
        };
        let err = ingest.apply(&mut store, &message).unwrap_err();
        assert!(matches!(err, Error::MalformedMessage(_)));
        assert!(err.is_event_local());

        let far = ingest.apply(&mut store, &candle("BTC/USD", "1m", i64::MAX, 11.0));
        assert!(matches!(far, Err(Error::MalformedMessage(_))));

        assert_eq!(store.snapshot(), &[Bar::from_price(120, 10.0, 1.0)]);
        let next = ingest.apply(&mut store, &tick("BTC/USD", 190, 11.0, None)).unwrap();
        assert_eq!(next, IngestOutcome::Tick(TickOutcome::Appended));
    }

    #[test]
    fn test_stale_tick_is_rejected() {
        let ingest = LiveIngest::new(key());
        let mut store = SeriesStore::new(key());
        store.merge_bars([Bar::from_price(60, 10.0, 1.0), Bar::from_price(120, 11.0, 1.0)]);

        let err = ingest.apply(&mut store, &tick("BTC/USD", 65, 99.0, Some(1.0))).unwrap_err();

        assert!(matches!(err, Error::StaleTick(_)));
        assert!(err.is_event_local());
        assert_eq!(store.snapshot()[0], Bar::from_price(60, 10.0, 1.0));
    }
}
