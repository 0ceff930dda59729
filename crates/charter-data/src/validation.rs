//! Validation utilities for incoming market data.

use charter_core::Bar;

/// Earliest accepted timestamp, 0001-01-01T00:00:00Z.
pub const MIN_TIMESTAMP: i64 = -62_135_596_800;
/// Latest accepted timestamp, 9999-12-31T23:59:59Z.
pub const MAX_TIMESTAMP: i64 = 253_402_300_799;

/// Validate a timestamp (unix seconds) lies in the calendar range.
pub fn validate_timestamp(timestamp: i64) -> bool {
    (MIN_TIMESTAMP..=MAX_TIMESTAMP).contains(&timestamp)
}

/// Validate a bar has finite values, a sane start time and a consistent
/// OHLC range.
pub fn validate_bar(bar: &Bar) -> bool {
    validate_timestamp(bar.start_time)
        && bar.open.is_finite()
        && bar.high.is_finite()
        && bar.low.is_finite()
        && bar.close.is_finite()
        && bar.volume.is_finite()
        && bar.high >= bar.open.max(bar.close)
        && bar.low <= bar.open.min(bar.close)
        && bar.volume >= 0.0
}

/// Validate a tick's timestamp, price and volume.
pub fn validate_tick(timestamp: i64, price: f64, volume: f64) -> bool {
    validate_timestamp(timestamp) && price.is_finite() && volume.is_finite() && volume >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bar_valid() {
        let bar = Bar::new(60, 100.0, 105.0, 95.0, 102.0, 1000.0);
        assert!(validate_bar(&bar));
    }

    #[test]
    fn test_validate_bar_flat() {
        assert!(validate_bar(&Bar::from_price(60, 10.0, 0.0)));
    }

    #[test]
    fn test_validate_bar_high_below_close() {
        let bar = Bar::new(60, 100.0, 101.0, 95.0, 102.0, 1.0);
        assert!(!validate_bar(&bar));
    }

    #[test]
    fn test_validate_bar_low_above_open() {
        let bar = Bar::new(60, 100.0, 105.0, 100.5, 102.0, 1.0);
        assert!(!validate_bar(&bar));
    }

    #[test]
    fn test_validate_bar_negative_volume() {
        let bar = Bar::new(60, 100.0, 105.0, 95.0, 102.0, -1.0);
        assert!(!validate_bar(&bar));
    }

    #[test]
    fn test_validate_bar_nan() {
        let bar = Bar::new(60, f64::NAN, 105.0, 95.0, 102.0, 1.0);
        assert!(!validate_bar(&bar));
    }

    #[test]
    fn test_validate_bar_out_of_range_time() {
        assert!(!validate_bar(&Bar::from_price(i64::MIN, 10.0, 1.0)));
        assert!(!validate_bar(&Bar::from_price(MAX_TIMESTAMP + 1, 10.0, 1.0)));
        assert!(validate_bar(&Bar::from_price(-60, 10.0, 1.0)));
    }

    #[test]
    fn test_validate_tick() {
        assert!(validate_tick(60, 10.5, 0.0));
        assert!(!validate_tick(60, f64::INFINITY, 1.0));
        assert!(!validate_tick(60, 10.5, -2.0));
        assert!(!validate_tick(i64::MIN, 10.5, 1.0));
        assert!(!validate_tick(i64::MAX, 10.5, 1.0));
        assert!(validate_tick(MIN_TIMESTAMP, 10.5, 1.0));
    }
}
