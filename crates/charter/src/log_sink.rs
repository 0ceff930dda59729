//! Series sink that reports to the log.

use chart_api::ConnectionStatus;
use charter_core::{Bar, SeriesKey};
use charter_sync::{LoadState, SeriesSink};

/// Logs structural changes at info level and in-place bar updates at debug.
#[derive(Debug, Default)]
pub struct LogSink {
    bar_count: usize,
    updates: u64,
}

impl LogSink {
    pub fn updates(&self) -> u64 {
        self.updates
    }
}

impl SeriesSink for LogSink {
    fn on_series_changed(&mut self, key: &SeriesKey, bars: &[Bar]) {
        self.updates += 1;
        let grew = bars.len() != self.bar_count;
        self.bar_count = bars.len();

        let Some(last) = bars.last() else {
            log::info!("{}: no bars", key);
            return;
        };

        let first = bars[0].start_time;
        if grew {
            log::info!(
                "{}: {} bars [{} .. {}], last o={} h={} l={} c={} v={}",
                key,
                bars.len(),
                first,
                last.start_time,
                last.open,
                last.high,
                last.low,
                last.close,
                last.volume
            );
        } else {
            log::debug!(
                "{}: bar {} c={} h={} l={} v={}",
                key,
                last.start_time,
                last.close,
                last.high,
                last.low,
                last.volume
            );
        }
    }

    fn on_connectivity_changed(&mut self, status: ConnectionStatus) {
        log::info!(
            "Connection {:?} (retry {})",
            status.state,
            status.retry_count
        );
    }

    fn on_load_state_changed(&mut self, key: &SeriesKey, state: &LoadState) {
        match state {
            LoadState::Failed(reason) => log::warn!("{}: history load failed: {}", key, reason),
            LoadState::Exhausted => log::info!("{}: no more history", key),
            other => log::debug!("{}: {:?}", key, other),
        }
    }
}
