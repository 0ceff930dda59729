//! Live stream frame types.

use serde::{Deserialize, Serialize};

/// Completed candle carried by a `candle` frame.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct StreamCandle {
    /// Bucket start (unix seconds).
    #[serde(rename = "startTime", alias = "start_time", alias = "time")]
    pub start_time: i64,
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

/// A decoded live stream frame.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    /// Server-authoritative completed candle for one (symbol, timeframe).
    Candle {
        /// Instrument.
        symbol: String,
        /// Timeframe label (e.g. "1m").
        timeframe: String,
        /// Candle payload.
        candle: StreamCandle,
    },
    /// A single trade/price observation.
    Tick {
        /// Instrument.
        symbol: String,
        /// Unix seconds.
        timestamp: i64,
        /// Trade price.
        price: f64,
        /// Traded volume, absent for price-only ticks.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        volume: Option<f64>,
    },
}

impl StreamMessage {
    /// Instrument this frame belongs to.
    pub fn symbol(&self) -> &str {
        match self {
            StreamMessage::Candle { symbol, .. } | StreamMessage::Tick { symbol, .. } => symbol,
        }
    }

    /// Whether this frame is relevant to the given series.
    ///
    /// Candles must match both instrument and timeframe; ticks only the
    /// instrument, since they are bucketed locally.
    pub fn matches(&self, instrument: &str, timeframe: &str) -> bool {
        match self {
            StreamMessage::Candle {
                symbol,
                timeframe: tf,
                ..
            } => symbol == instrument && tf == timeframe,
            StreamMessage::Tick { symbol, .. } => symbol == instrument,
        }
    }
}

/// Outcome of decoding one text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A candle or tick frame.
    Message(StreamMessage),
    /// Valid JSON with a `type` this client does not handle.
    Unsupported(String),
    /// Not JSON, or missing required fields.
    Malformed(String),
}

impl Frame {
    /// Decode a JSON text frame.
    pub fn parse(text: &str) -> Frame {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => return Frame::Malformed(format!("invalid JSON: {e}")),
        };

        let kind = match value.get("type").and_then(|t| t.as_str()) {
            Some(kind) => kind.to_string(),
            None => return Frame::Malformed("missing \"type\" field".to_string()),
        };

        match kind.as_str() {
            "candle" | "tick" => match serde_json::from_value::<StreamMessage>(value) {
                Ok(msg) => Frame::Message(msg),
                Err(e) => Frame::Malformed(format!("invalid {kind} frame: {e}")),
            },
            _ => Frame::Unsupported(kind),
        }
    }
}
