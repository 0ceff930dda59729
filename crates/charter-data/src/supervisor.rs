//! Process-wide owner of the live stream connection.
//!
//! The supervisor starts the stream lazily on the first `subscribe` and fans
//! its events out: stream messages go to subscriptions whose key matches,
//! connectivity changes go to every subscription.

use std::sync::Arc;

use chart_api::{ConnectionStatus, StreamMessage, StreamSocket, WsConfig, WsEvent};
use charter_core::SeriesKey;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};

/// A stream of connectivity and message events, started once.
pub trait LiveFeed: Send + 'static {
    /// Start producing events. Called at most once.
    fn start(&mut self) -> chart_api::Result<mpsc::Receiver<WsEvent>>;
}

impl LiveFeed for StreamSocket {
    fn start(&mut self) -> chart_api::Result<mpsc::Receiver<WsEvent>> {
        self.connect()
    }
}

/// Event delivered to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Message(StreamMessage),
    Connectivity(ConnectionStatus),
}

/// Receiving end of a key subscription. Dropping it unsubscribes lazily;
/// [`ConnectionSupervisor::unsubscribe`] does so immediately.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    key: SeriesKey,
    events: mpsc::Receiver<LiveEvent>,
}

impl Subscription {
    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// Next event, or `None` once the supervisor stops routing to it.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }
}

struct Route {
    id: u64,
    key: SeriesKey,
    tx: mpsc::Sender<LiveEvent>,
}

struct Inner {
    feed: Option<Box<dyn LiveFeed>>,
    started: bool,
    routes: Vec<Route>,
    next_id: u64,
    status: ConnectionStatus,
}

/// Shared owner of the stream connection.
///
/// Create one per process and hand it out as `Arc<ConnectionSupervisor>`.
pub struct ConnectionSupervisor {
    inner: Arc<Mutex<Inner>>,
    buffer: usize,
}

impl ConnectionSupervisor {
    /// Supervise an arbitrary feed.
    pub fn new(feed: impl LiveFeed) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                feed: Some(Box::new(feed)),
                started: false,
                routes: Vec::new(),
                next_id: 0,
                status: ConnectionStatus::disconnected(),
            })),
            buffer: 256,
        }
    }

    /// Supervise a reconnecting WebSocket built from `config`.
    pub fn websocket(config: WsConfig) -> Self {
        let buffer = config.channel_buffer_size;
        Self::new(StreamSocket::with_config(config)).with_buffer_size(buffer)
    }

    /// Per-subscription channel capacity.
    pub fn with_buffer_size(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// Last connectivity status seen on the feed.
    pub async fn status(&self) -> ConnectionStatus {
        self.inner.lock().await.status
    }

    /// Whether the feed has been started.
    pub async fn is_started(&self) -> bool {
        self.inner.lock().await.started
    }

    /// Subscribe to events for `key`, starting the feed if this is the first
    /// subscription. The current status is delivered first.
    pub async fn subscribe(&self, key: SeriesKey) -> Result<Subscription> {
        let mut inner = self.inner.lock().await;

        if !inner.started {
            let feed = inner.feed.as_mut().ok_or_else(|| {
                Error::StreamError(chart_api::Error::InvalidParameter(
                    "supervisor has been shut down".to_string(),
                ))
            })?;
            let events = feed.start().map_err(Error::StreamError)?;
            inner.started = true;
            log::info!("Live feed started for first subscriber {}", key);

            tokio::spawn(route_events(Arc::clone(&self.inner), events));
        }

        let (tx, rx) = mpsc::channel(self.buffer);
        // Fresh channel with capacity >= 1, so this cannot fail.
        let _ = tx.try_send(LiveEvent::Connectivity(inner.status));

        let id = inner.next_id;
        inner.next_id += 1;
        inner.routes.push(Route {
            id,
            key: key.clone(),
            tx,
        });
        log::debug!("Subscribed {} (id {}, {} total)", key, id, inner.routes.len());

        Ok(Subscription {
            id,
            key,
            events: rx,
        })
    }

    /// Stop routing events to `subscription`.
    pub async fn unsubscribe(&self, subscription: Subscription) {
        let mut inner = self.inner.lock().await;
        inner.routes.retain(|route| route.id != subscription.id);
        log::debug!(
            "Unsubscribed {} (id {}, {} left)",
            subscription.key,
            subscription.id,
            inner.routes.len()
        );
    }

    /// Number of live subscriptions.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.routes.len()
    }

    /// Drop the feed, closing the connection. Existing subscriptions end.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.feed = None;
        inner.routes.clear();
        log::info!("Live feed shut down");
    }
}

/// Forward feed events to matching subscriptions until the feed ends.
async fn route_events(inner: Arc<Mutex<Inner>>, mut events: mpsc::Receiver<WsEvent>) {
    while let Some(event) = events.recv().await {
        let (targets, live) = {
            let mut inner = inner.lock().await;
            let live = match event {
                WsEvent::Status(status) => {
                    if status.state != inner.status.state {
                        log::info!("Stream {:?} (retry {})", status.state, status.retry_count);
                    }
                    inner.status = status;
                    LiveEvent::Connectivity(status)
                }
                WsEvent::Message(message) => LiveEvent::Message(message),
            };

            let targets: Vec<(u64, mpsc::Sender<LiveEvent>)> = inner
                .routes
                .iter()
                .filter(|route| match &live {
                    LiveEvent::Connectivity(_) => true,
                    LiveEvent::Message(message) => {
                        message.matches(&route.key.instrument, route.key.timeframe.label())
                    }
                })
                .map(|route| (route.id, route.tx.clone()))
                .collect();
            (targets, live)
        };

        let mut closed = Vec::new();
        for (id, tx) in targets {
            if tx.send(live.clone()).await.is_err() {
                closed.push(id);
            }
        }

        if !closed.is_empty() {
            let mut inner = inner.lock().await;
            inner.routes.retain(|route| !closed.contains(&route.id));
            log::debug!("Dropped {} closed subscriptions", closed.len());
        }
    }

    log::info!("Live feed ended");
    inner.lock().await.status = ConnectionStatus::disconnected();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_api::{ConnectionState, StreamCandle};
    use charter_core::Timeframe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Feed driven by the test through a sender.
    struct TestFeed {
        events: Option<mpsc::Receiver<WsEvent>>,
        starts: Arc<AtomicUsize>,
    }

    impl LiveFeed for TestFeed {
        fn start(&mut self) -> chart_api::Result<mpsc::Receiver<WsEvent>> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.events.take().ok_or(chart_api::Error::ConnectionClosed)
        }
    }

    fn supervisor() -> (ConnectionSupervisor, mpsc::Sender<WsEvent>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::channel(16);
        let starts = Arc::new(AtomicUsize::new(0));
        let feed = TestFeed {
            events: Some(rx),
            starts: starts.clone(),
        };
        (ConnectionSupervisor::new(feed), tx, starts)
    }

    fn connected() -> ConnectionStatus {
        ConnectionStatus {
            state: ConnectionState::Connected,
            retry_count: 0,
        }
    }

    fn tick(symbol: &str) -> StreamMessage {
        StreamMessage::Tick {
            symbol: symbol.into(),
            timestamp: 60,
            price: 1.0,
            volume: None,
        }
    }

    fn candle(symbol: &str, timeframe: &str) -> StreamMessage {
        StreamMessage::Candle {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            candle: StreamCandle {
                start_time: 60,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0.0,
            },
        }
    }

    async fn next(sub: &mut Subscription) -> LiveEvent {
        tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timed out")
            .expect("subscription closed")
    }

    async fn assert_quiet(sub: &mut Subscription) {
        let got = tokio::time::timeout(Duration::from_millis(50), sub.recv()).await;
        assert!(got.is_err(), "unexpected event: {got:?}");
    }

    #[tokio::test]
    async fn test_feed_starts_lazily_once() {
        let (supervisor, _tx, starts) = supervisor();
        assert!(!supervisor.is_started().await);
        assert_eq!(starts.load(Ordering::SeqCst), 0);

        let _a = supervisor.subscribe(SeriesKey::new("SPY", Timeframe::Min1)).await.unwrap();
        let _b = supervisor.subscribe(SeriesKey::new("QQQ", Timeframe::Min5)).await.unwrap();

        assert!(supervisor.is_started().await);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.subscriber_count().await, 2);
    }

    #[tokio::test]
    async fn test_routes_by_key() {
        let (supervisor, tx, _) = supervisor();
        let spy_1m_key = SeriesKey::new("SPY", Timeframe::Min1);
        let spy_5m_key = SeriesKey::new("SPY", Timeframe::Min5);
        let mut spy_1m = supervisor.subscribe(spy_1m_key).await.unwrap();
        let mut spy_5m = supervisor.subscribe(spy_5m_key).await.unwrap();
        let mut dia = supervisor.subscribe(SeriesKey::new("DIA", Timeframe::Min1)).await.unwrap();

        // Initial status.
        for sub in [&mut spy_1m, &mut spy_5m, &mut dia] {
            assert_eq!(
                next(sub).await,
                LiveEvent::Connectivity(ConnectionStatus::disconnected())
            );
        }

        tx.send(WsEvent::Message(candle("SPY", "5m"))).await.unwrap();
        tx.send(WsEvent::Message(tick("SPY"))).await.unwrap();

        assert_eq!(next(&mut spy_5m).await, LiveEvent::Message(candle("SPY", "5m")));
        assert_eq!(next(&mut spy_5m).await, LiveEvent::Message(tick("SPY")));
        assert_eq!(next(&mut spy_1m).await, LiveEvent::Message(tick("SPY")));
        assert_quiet(&mut dia).await;
    }

    #[tokio::test]
    async fn test_connectivity_reaches_everyone() {
        let (supervisor, tx, _) = supervisor();
        let mut a = supervisor.subscribe(SeriesKey::new("SPY", Timeframe::Min1)).await.unwrap();
        let mut b = supervisor.subscribe(SeriesKey::new("DIA", Timeframe::Hour4)).await.unwrap();
        next(&mut a).await;
        next(&mut b).await;

        tx.send(WsEvent::Status(connected())).await.unwrap();

        assert_eq!(next(&mut a).await, LiveEvent::Connectivity(connected()));
        assert_eq!(next(&mut b).await, LiveEvent::Connectivity(connected()));
        assert_eq!(supervisor.status().await, connected());

        // Late subscribers see the current status first.
        let mut late = supervisor.subscribe(SeriesKey::new("QQQ", Timeframe::Min15)).await.unwrap();
        assert_eq!(next(&mut late).await, LiveEvent::Connectivity(connected()));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_routing() {
        let (supervisor, tx, _) = supervisor();
        let key = SeriesKey::new("SPY", Timeframe::Min1);
        let sub = supervisor.subscribe(key.clone()).await.unwrap();
        let mut other = supervisor.subscribe(key).await.unwrap();
        next(&mut other).await;

        supervisor.unsubscribe(sub).await;
        assert_eq!(supervisor.subscriber_count().await, 1);

        tx.send(WsEvent::Message(tick("SPY"))).await.unwrap();
        assert_eq!(next(&mut other).await, LiveEvent::Message(tick("SPY")));
    }

    #[tokio::test]
    async fn test_dropped_subscriptions_are_pruned() {
        let (supervisor, tx, _) = supervisor();
        let dropped = supervisor.subscribe(SeriesKey::new("SPY", Timeframe::Min1)).await.unwrap();
        let mut kept = supervisor.subscribe(SeriesKey::new("DIA", Timeframe::Min1)).await.unwrap();
        next(&mut kept).await;
        drop(dropped);

        tx.send(WsEvent::Status(connected())).await.unwrap();
        assert_eq!(next(&mut kept).await, LiveEvent::Connectivity(connected()));
        tokio::task::yield_now().await;

        assert_eq!(supervisor.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_ends_subscriptions() {
        let (supervisor, _tx, _) = supervisor();
        let mut sub = supervisor.subscribe(SeriesKey::new("SPY", Timeframe::Min1)).await.unwrap();
        next(&mut sub).await;

        supervisor.shutdown().await;

        assert_eq!(sub.recv().await, None);
        assert_eq!(supervisor.subscriber_count().await, 0);
    }
}
