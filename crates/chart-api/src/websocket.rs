//! WebSocket client for the live tick/candle stream.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::config::WsConfig;
use crate::error::{Error, Result};
use crate::types::{Frame, StreamMessage};

/// WebSocket connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected. A reconnect may be scheduled.
    Disconnected,
    /// Connecting.
    Connecting,
    /// Connected and receiving frames.
    Connected,
}

/// Connection state plus the number of reconnect attempts since the last
/// successful open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Consecutive reconnect attempts; reset to 0 on open.
    pub retry_count: u32,
}

impl ConnectionStatus {
    /// Status before the first connect.
    pub const fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_count: 0,
        }
    }

    /// Whether the stream is currently open.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::disconnected()
    }
}

/// Events emitted by the stream socket, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    /// Connection state transition.
    Status(ConnectionStatus),
    /// A decoded candle or tick frame.
    Message(StreamMessage),
}

/// Internal commands for the WebSocket connection.
#[derive(Debug)]
enum WsCommand {
    Close,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a connected session ended.
enum SessionEnd {
    /// Socket closed or errored; reconnect if allowed.
    Lost(Error),
    /// Close requested by the owner.
    Closed,
    /// Nobody is listening anymore.
    ReceiverDropped,
}

/// Reconnecting WebSocket client for the live stream.
#[derive(Debug)]
pub struct StreamSocket {
    config: WsConfig,
    status: Arc<Mutex<ConnectionStatus>>,
    command_tx: Option<mpsc::Sender<WsCommand>>,
}

impl StreamSocket {
    /// Create a new stream socket with default configuration.
    pub fn new() -> Self {
        Self::with_config(WsConfig::default())
    }

    /// Create a new stream socket with custom configuration.
    pub fn with_config(config: WsConfig) -> Self {
        Self {
            config,
            status: Arc::new(Mutex::new(ConnectionStatus::disconnected())),
            command_tx: None,
        }
    }

    /// Start the connection task.
    ///
    /// Returns immediately; connection progress is reported through
    /// [`WsEvent::Status`] events on the returned receiver. Failing to
    /// connect is never an error here, the task keeps retrying per the
    /// reconnect policy.
    pub fn connect(&mut self) -> Result<mpsc::Receiver<WsEvent>> {
        if self.command_tx.is_some() {
            return Err(Error::InvalidParameter(
                "stream socket already started".to_string(),
            ));
        }

        let (command_tx, command_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(self.config.channel_buffer_size.max(1));

        self.command_tx = Some(command_tx);

        let config = self.config.clone();
        let status = Arc::clone(&self.status);

        tokio::spawn(async move {
            run_connection(config, status, command_rx, event_tx).await;
        });

        Ok(event_rx)
    }

    /// Close the WebSocket connection and stop reconnecting.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(WsCommand::Close).await;
        }

        *self.status.lock().await = ConnectionStatus::disconnected();

        Ok(())
    }

    /// Get the current connection status.
    pub async fn status(&self) -> ConnectionStatus {
        *self.status.lock().await
    }

    /// Check if connected.
    pub async fn is_connected(&self) -> bool {
        self.status.lock().await.is_connected()
    }

    /// The configuration this socket was created with.
    pub fn config(&self) -> &WsConfig {
        &self.config
    }
}

impl Default for StreamSocket {
    fn default() -> Self {
        Self::new()
    }
}

/// Record a transition and forward it. Returns false once the receiver is gone.
async fn transition(
    status: &Mutex<ConnectionStatus>,
    event_tx: &mpsc::Sender<WsEvent>,
    next: ConnectionStatus,
) -> bool {
    *status.lock().await = next;
    event_tx.send(WsEvent::Status(next)).await.is_ok()
}

async fn open_stream(url: &str) -> Result<WsStream> {
    let (stream, _) = connect_async(url).await?;
    Ok(stream)
}

/// Run the WebSocket connection loop.
async fn run_connection(
    config: WsConfig,
    status: Arc<Mutex<ConnectionStatus>>,
    mut command_rx: mpsc::Receiver<WsCommand>,
    event_tx: mpsc::Sender<WsEvent>,
) {
    let mut reconnect_attempts: u32 = 0;

    loop {
        let connecting = ConnectionStatus {
            state: ConnectionState::Connecting,
            retry_count: reconnect_attempts,
        };
        if !transition(&status, &event_tx, connecting).await {
            return;
        }

        let connected = tokio::select! {
            result = open_stream(config.url.as_str()) => result,
            _ = command_rx.recv() => {
                *status.lock().await = ConnectionStatus::disconnected();
                return;
            }
        };

        match connected {
            Ok(stream) => {
                tracing::info!("Stream connected to {}", config.url);
                reconnect_attempts = 0;
                let open = ConnectionStatus {
                    state: ConnectionState::Connected,
                    retry_count: 0,
                };
                if !transition(&status, &event_tx, open).await {
                    return;
                }

                match run_session(&config, stream, &mut command_rx, &event_tx).await {
                    SessionEnd::Lost(reason) => {
                        tracing::warn!("Stream to {} lost: {}", config.url, reason);
                    }
                    SessionEnd::Closed => {
                        let _ =
                            transition(&status, &event_tx, ConnectionStatus::disconnected()).await;
                        return;
                    }
                    SessionEnd::ReceiverDropped => {
                        *status.lock().await = ConnectionStatus::disconnected();
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Stream connection to {} failed: {}", config.url, e);
            }
        }

        let lost = ConnectionStatus {
            state: ConnectionState::Disconnected,
            retry_count: reconnect_attempts,
        };
        if !transition(&status, &event_tx, lost).await {
            return;
        }

        let exhausted = config
            .max_reconnect_attempts
            .is_some_and(|max| reconnect_attempts >= max);
        if !config.auto_reconnect || exhausted {
            tracing::warn!("Stream reconnect disabled or exhausted, giving up");
            return;
        }

        reconnect_attempts += 1;
        let delay = config.reconnect_backoff(reconnect_attempts);
        tracing::info!(
            "Reconnecting stream in {:?} (attempt {})",
            delay,
            reconnect_attempts
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = command_rx.recv() => return,
        }
    }
}

/// Pump one connected socket until it closes.
async fn run_session(
    config: &WsConfig,
    stream: WsStream,
    command_rx: &mut mpsc::Receiver<WsCommand>,
    event_tx: &mpsc::Sender<WsEvent>,
) -> SessionEnd {
    let (mut write, mut read) = stream.split();
    let mut ping_interval =
        interval_at(Instant::now() + config.ping_interval, config.ping_interval);

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match Frame::parse(&text) {
                        Frame::Message(message) => {
                            if event_tx.send(WsEvent::Message(message)).await.is_err() {
                                tracing::warn!("Event receiver dropped");
                                return SessionEnd::ReceiverDropped;
                            }
                        }
                        Frame::Unsupported(kind) => {
                            tracing::debug!("Ignoring stream frame of type {:?}", kind);
                        }
                        Frame::Malformed(reason) => {
                            tracing::warn!(
                                "Dropping malformed stream frame ({}): {}",
                                reason,
                                text.chars().take(100).collect::<String>()
                            );
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Lost(Error::ConnectionClosed);
                    }
                    Some(Ok(Message::Binary(data))) => {
                        tracing::debug!("Ignoring {} byte binary frame", data.len());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(e.into()),
                    None => return SessionEnd::Lost(Error::ConnectionClosed),
                }
            }

            cmd = command_rx.recv() => {
                match cmd {
                    Some(WsCommand::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return SessionEnd::Closed;
                    }
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    return SessionEnd::Lost(e.into());
                }
            }
        }
    }
}
