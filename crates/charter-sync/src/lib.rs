//! Live chart synchronization for charter.
//!
//! A [`ChartSession`] owns the series for the selected (instrument,
//! timeframe) key. It merges paginated history from the `HistoryLoader`
//! with live frames from the `ConnectionSupervisor`, drives backfill as the
//! viewport approaches the oldest bar, resyncs after reconnects and reports
//! every change to a [`SeriesSink`].

pub mod session;
pub mod sink;

use thiserror::Error;

pub use session::{ChartSession, SessionCommand, SessionHandle};
pub use sink::SeriesSink;

/// History load state for the active key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// A page request is outstanding.
    Loading,
    /// The last page merged successfully.
    Loaded,
    /// The last page request failed. Retried on the next trigger.
    Failed(String),
    /// The backend has no older bars for this key.
    Exhausted,
}

impl Default for LoadState {
    fn default() -> Self {
        Self::Loading
    }
}

/// Errors returned by [`SessionHandle`].
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    InvalidTimeframe(#[from] charter_core::InvalidTimeframe),
    #[error("Chart session has stopped")]
    Closed,
}
