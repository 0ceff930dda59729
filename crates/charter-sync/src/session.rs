//! The chart session event loop.

use std::future::pending;
use std::sync::Arc;

use chart_api::{ConnectionState, ConnectionStatus};
use charter_core::{SeriesKey, SeriesStore, Timeframe};
use charter_data::{
    ConnectionSupervisor, Error, HistoryLoader, LiveEvent, LiveIngest, PageOutcome, Subscription,
};
use tokio::sync::mpsc;

use crate::sink::SeriesSink;
use crate::{LoadState, SessionError};

/// Commands accepted by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Discard the current series and load `key`.
    SelectKey(SeriesKey),
    /// The viewport's leading edge moved to this bar index, counted from the
    /// oldest loaded bar.
    ViewportChanged(i64),
    /// Reload the latest page and merge it over the current series.
    Resync,
    /// Stop the session loop.
    Shutdown,
}

/// Cloneable control handle for a [`ChartSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Select an instrument and timeframe label such as `"5m"`.
    pub async fn select_key(&self, instrument: &str, timeframe: &str) -> Result<(), SessionError> {
        let timeframe: Timeframe = timeframe.parse()?;
        self.send(SessionCommand::SelectKey(SeriesKey::new(instrument, timeframe)))
            .await
    }

    pub async fn viewport_changed(&self, leading_index: i64) -> Result<(), SessionError> {
        self.send(SessionCommand::ViewportChanged(leading_index)).await
    }

    pub async fn resync(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Resync).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown).await
    }

    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.tx.send(command).await.map_err(|_| SessionError::Closed)
    }
}

/// A finished page load, tagged with the selection it was issued for.
struct PageResult {
    key: SeriesKey,
    generation: u64,
    outcome: charter_data::Result<PageOutcome>,
}

/// State for the selected key. Replaced wholesale on every selection.
struct Active {
    store: SeriesStore,
    ingest: LiveIngest,
    subscription: Option<Subscription>,
    /// This session has a page request outstanding for the current generation.
    loading: bool,
    /// A page request that arrived while another was outstanding.
    deferred: Option<Option<i64>>,
}

/// Owns the active series and serializes every mutation of it.
///
/// Commands, live events and finished page loads are handled one at a time
/// by [`ChartSession::run`]; page fetches run on spawned tasks.
pub struct ChartSession<S> {
    supervisor: Arc<ConnectionSupervisor>,
    loader: Arc<HistoryLoader>,
    sink: S,
    commands: mpsc::Receiver<SessionCommand>,
    pages_tx: mpsc::Sender<PageResult>,
    pages_rx: mpsc::Receiver<PageResult>,
    active: Option<Active>,
    generation: u64,
    /// Last status handed to the sink.
    last_status: Option<ConnectionStatus>,
    seen_connected: bool,
    connection_lost: bool,
}

impl<S: SeriesSink> ChartSession<S> {
    pub fn new(
        supervisor: Arc<ConnectionSupervisor>,
        loader: Arc<HistoryLoader>,
        sink: S,
    ) -> (Self, SessionHandle) {
        let (tx, commands) = mpsc::channel(64);
        let (pages_tx, pages_rx) = mpsc::channel(16);

        let session = Self {
            supervisor,
            loader,
            sink,
            commands,
            pages_tx,
            pages_rx,
            active: None,
            generation: 0,
            last_status: None,
            seen_connected: false,
            connection_lost: false,
        };

        (session, SessionHandle { tx })
    }

    /// Run until shut down or every handle is dropped. Returns the sink.
    pub async fn run(mut self) -> S {
        log::info!("Chart session started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(page) = self.pages_rx.recv() => self.handle_page(page),
                event = next_live_event(&mut self.active) => self.handle_live(event),
            }
        }

        self.deactivate().await;
        log::info!("Chart session stopped");
        self.sink
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SelectKey(key) => self.select(key).await,
            SessionCommand::ViewportChanged(leading_index) => self.viewport_changed(leading_index),
            SessionCommand::Resync => self.request_page(None),
            SessionCommand::Shutdown => {}
        }
    }

    async fn select(&mut self, key: SeriesKey) {
        self.deactivate().await;
        self.generation += 1;
        self.loader.forget(&key);

        let subscription = match self.supervisor.subscribe(key.clone()).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                log::error!("Live updates unavailable for {}: {}", key, e);
                None
            }
        };

        log::info!("Selected {} (generation {})", key, self.generation);
        let store = SeriesStore::new(key.clone());
        self.sink.on_series_changed(&key, store.snapshot());

        self.active = Some(Active {
            store,
            ingest: LiveIngest::new(key),
            subscription,
            loading: false,
            deferred: None,
        });
        self.request_page(None);
    }

    async fn deactivate(&mut self) {
        if let Some(active) = self.active.take() {
            log::debug!("Discarding {}", active.store.key());
            if let Some(subscription) = active.subscription {
                self.supervisor.unsubscribe(subscription).await;
            }
        }
    }

    fn viewport_changed(&mut self, leading_index: i64) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        if active.store.is_empty() || active.loading {
            return;
        }
        if !self.loader.should_backfill(active.store.key(), leading_index) {
            return;
        }

        log::debug!("Backfilling {} at index {}", active.store.key(), leading_index);
        let before = active.store.oldest_time();
        self.request_page(before);
    }

    /// Spawn a page load for the active key, or defer it while another load
    /// for the key is outstanding.
    fn request_page(&mut self, before: Option<i64>) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let key = active.store.key().clone();

        if active.loading || self.loader.is_in_flight(&key) {
            // Latest-page requests take precedence over backfill.
            active.deferred = match active.deferred {
                Some(None) => Some(None),
                _ => Some(before),
            };
            log::debug!("Deferring page load for {} (before={:?})", key, before);
            return;
        }

        active.loading = true;
        self.sink.on_load_state_changed(&key, &LoadState::Loading);

        let loader = Arc::clone(&self.loader);
        let tx = self.pages_tx.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let outcome = loader.load_page(&key, before).await;
            let _ = tx
                .send(PageResult {
                    key,
                    generation,
                    outcome,
                })
                .await;
        });
    }

    fn handle_page(&mut self, page: PageResult) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.store.key() != &page.key {
            log::debug!("Dropping page for discarded key {}", page.key);
            return;
        }

        if page.generation != self.generation {
            log::debug!(
                "Dropping page for {} from generation {}",
                page.key,
                page.generation
            );
        } else {
            active.loading = false;
            let key = &page.key;

            match page.outcome {
                Ok(PageOutcome::Loaded(bars)) => {
                    let summary = active.store.merge_bars(bars);
                    log::debug!(
                        "Merged page into {}: {} new, {} replaced, {} total",
                        key,
                        summary.inserted,
                        summary.replaced,
                        active.store.len()
                    );
                    if !summary.is_empty() {
                        self.sink.on_series_changed(key, active.store.snapshot());
                    }
                    self.sink.on_load_state_changed(key, &LoadState::Loaded);
                }
                Ok(PageOutcome::Exhausted) => {
                    self.sink.on_load_state_changed(key, &LoadState::Exhausted);
                }
                Ok(PageOutcome::AlreadyInFlight) => {
                    log::debug!("Page load for {} raced another load", key);
                }
                Err(e) => {
                    log::warn!("History load for {} failed: {}", key, e);
                    self.sink
                        .on_load_state_changed(key, &LoadState::Failed(e.to_string()));
                }
            }
        }

        if active.loading {
            return;
        }
        if let Some(before) = active.deferred.take() {
            self.request_page(before);
        }
    }

    fn handle_live(&mut self, event: LiveEvent) {
        match event {
            LiveEvent::Connectivity(status) => self.connectivity_changed(status),
            LiveEvent::Message(message) => {
                let Some(active) = self.active.as_mut() else {
                    return;
                };
                match active.ingest.apply(&mut active.store, &message) {
                    Ok(outcome) if outcome.changed() => {
                        self.sink.on_series_changed(active.store.key(), active.store.snapshot());
                    }
                    Ok(_) => {}
                    Err(Error::StaleTick(stale)) => {
                        log::debug!("{}: {}", active.store.key(), stale)
                    }
                    Err(e) => {
                        log::warn!("Dropping live message for {}: {}", active.store.key(), e)
                    }
                }
            }
        }
    }

    /// Every new subscription replays the supervisor's current status, so
    /// repeats of the last reported status are dropped here.
    fn connectivity_changed(&mut self, status: ConnectionStatus) {
        if self.last_status == Some(status) {
            return;
        }
        self.last_status = Some(status);
        self.sink.on_connectivity_changed(status);

        match status.state {
            ConnectionState::Connected => {
                self.seen_connected = true;
                if std::mem::take(&mut self.connection_lost) {
                    log::info!("Stream reconnected, resyncing latest page");
                    self.request_page(None);
                }
            }
            ConnectionState::Disconnected if self.seen_connected => {
                self.connection_lost = true;
            }
            _ => {}
        }
    }
}

/// Next event from the active subscription. Pends forever without one.
async fn next_live_event(active: &mut Option<Active>) -> LiveEvent {
    let Some(active) = active.as_mut() else {
        return pending().await;
    };
    let Some(subscription) = active.subscription.as_mut() else {
        return pending().await;
    };

    match subscription.recv().await {
        Some(event) => event,
        None => {
            log::warn!("Live subscription for {} ended", subscription.key());
            active.subscription = None;
            pending().await
        }
    }
}
