//! Error taxonomy for the chart engine.

use charter_core::{InvalidTimeframe, SeriesKey, StaleTick};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors. None of these is fatal: callers log and carry on.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    InvalidTimeframe(#[from] InvalidTimeframe),

    #[error("Failed to fetch history for {key}: {source}")]
    FetchFailed {
        key: SeriesKey,
        #[source]
        source: chart_api::Error,
    },

    #[error("Stream error: {0}")]
    StreamError(#[source] chart_api::Error),

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error(transparent)]
    StaleTick(#[from] StaleTick),
}

impl Error {
    /// Whether this error only concerns a single dropped event.
    pub fn is_event_local(&self) -> bool {
        matches!(self, Error::MalformedMessage(_) | Error::StaleTick(_))
    }
}
