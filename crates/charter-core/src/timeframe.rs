//! Timeframe types and bucket-boundary arithmetic.

use std::fmt;
use std::str::FromStr;

/// Timeframe enumeration for the supported chart periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    Min1,  // 1 minute
    Min5,  // 5 minutes
    Min15, // 15 minutes
    Hour1, // 1 hour
    Hour4, // 4 hours
}

impl Timeframe {
    /// Returns the bucket width of this timeframe in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Timeframe::Min1 => 60,
            Timeframe::Min5 => 60 * 5,
            Timeframe::Min15 => 60 * 15,
            Timeframe::Hour1 => 60 * 60,
            Timeframe::Hour4 => 60 * 240,
        }
    }

    /// Returns the wire label for this timeframe.
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::Min1 => "1m",
            Timeframe::Min5 => "5m",
            Timeframe::Min15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
        }
    }

    /// Returns all available timeframes in order.
    pub fn all() -> &'static [Timeframe] {
        &[
            Timeframe::Min1,
            Timeframe::Min5,
            Timeframe::Min15,
            Timeframe::Hour1,
            Timeframe::Hour4,
        ]
    }

    /// Start of the bucket containing `timestamp`.
    pub fn bucket_start(&self, timestamp: i64) -> i64 {
        bucket_start(timestamp, *self)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error returned when a timeframe label is not one of the supported values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTimeframe(pub String);

impl fmt::Display for InvalidTimeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid timeframe: {:?}", self.0)
    }
}

impl std::error::Error for InvalidTimeframe {}

impl FromStr for Timeframe {
    type Err = InvalidTimeframe;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::all()
            .iter()
            .copied()
            .find(|tf| tf.label() == s)
            .ok_or_else(|| InvalidTimeframe(s.to_string()))
    }
}

/// Map a timestamp (unix seconds) to the start of its containing bar.
///
/// Floors towards negative infinity, so pre-epoch timestamps land in the
/// bucket below them. Near `i64::MIN`, where the floored boundary is not
/// representable, saturates to the lowest representable boundary.
pub fn bucket_start(timestamp: i64, timeframe: Timeframe) -> i64 {
    let width = timeframe.seconds();
    let index = timestamp.div_euclid(width);
    index
        .checked_mul(width)
        .unwrap_or_else(|| (index + 1) * width)
}
