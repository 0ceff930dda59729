//! # Chart API Client Library
//!
//! Client for the market-data backend that feeds the charter engine.
//!
//! ## Features
//!
//! - **Candles REST endpoint**: paginated historical bars with a bounded retry policy
//! - **Live stream**: JSON tick/candle frames over a persistent WebSocket with
//!   automatic reconnect and connectivity events
//! - **Type Safety**: Strongly typed wire models
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chart_api::ChartClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chart_api::Error> {
//!     let client = ChartClient::new(chart_api::Config::default())?;
//!
//!     // Most recent page of 1m candles
//!     let candles = client.candles("BTC/USD", "1m", 1000, None).await?;
//!     println!("{} candles", candles.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Live Stream
//!
//! ```rust,ignore
//! use chart_api::{StreamSocket, WsEvent};
//!
//! let mut socket = StreamSocket::new();
//! let mut rx = socket.connect()?;
//!
//! while let Some(event) = rx.recv().await {
//!     match event {
//!         WsEvent::Message(msg) => println!("{msg:?}"),
//!         WsEvent::Status(status) => println!("connection: {:?}", status.state),
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod types;
pub mod websocket;

// Re-exports for convenience
pub use client::ChartClient;
pub use config::{Config, RetryConfig, WsConfig};
pub use error::{Error, Result};
pub use types::{CandleDto, CandlesResponse, StreamCandle, StreamMessage};
pub use websocket::{ConnectionState, ConnectionStatus, StreamSocket, WsEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default base URL for the REST API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default URL for the live stream.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";

/// Maximum number of candles the backend returns per page.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Prelude module for convenient imports.
pub mod prelude {
    //! Common imports for using the chart API client.

    pub use crate::client::ChartClient;
    pub use crate::config::{Config, RetryConfig, WsConfig};
    pub use crate::error::{Error, Result};
    pub use crate::types::{CandleDto, StreamCandle, StreamMessage};
    pub use crate::websocket::{ConnectionState, ConnectionStatus, StreamSocket, WsEvent};
}
