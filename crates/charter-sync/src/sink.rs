//! Output side of a chart session.

use chart_api::ConnectionStatus;
use charter_core::{Bar, SeriesKey};

use crate::LoadState;

/// Receives the series after every mutation, plus connectivity and load
/// state changes. Called only from the session loop.
pub trait SeriesSink: Send + 'static {
    /// The full ordered series for `key`. Empty right after a key change.
    fn on_series_changed(&mut self, key: &SeriesKey, bars: &[Bar]);

    fn on_connectivity_changed(&mut self, status: ConnectionStatus);

    fn on_load_state_changed(&mut self, _key: &SeriesKey, _state: &LoadState) {}
}
