//! Error types for the chart API client.

use std::fmt;

/// Result type alias for chart API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the chart API client.
#[derive(Debug)]
pub enum Error {
    /// HTTP request failed
    Http(reqwest::Error),
    /// WebSocket error
    WebSocket(tokio_tungstenite::tungstenite::Error),
    /// JSON serialization/deserialization error
    Json(serde_json::Error),
    /// Server answered with a non-success status
    Status {
        /// HTTP status code
        code: u16,
        /// Response body (truncated)
        body: String,
    },
    /// Invalid parameter provided
    InvalidParameter(String),
    /// Connection closed unexpectedly
    ConnectionClosed,
    /// Timeout waiting for response
    Timeout,
    /// URL parsing error
    UrlParse(url::ParseError),
}

impl Error {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Error::Status { code, .. } => *code == 429 || *code >= 500,
            Error::Timeout | Error::ConnectionClosed => true,
            _ => false,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::UrlParse(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::WebSocket(e) => write!(f, "WebSocket error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Status { code, body } => write!(f, "HTTP {code}: {body}"),
            Error::InvalidParameter(msg) => write!(f, "Invalid parameter: {msg}"),
            Error::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Error::Timeout => write!(f, "Request timed out"),
            Error::UrlParse(e) => write!(f, "URL parse error: {e}"),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Http(err)
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::UrlParse(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retry_classification() {
        let server = Error::Status {
            code: 503,
            body: String::new(),
        };
        let limited = Error::Status {
            code: 429,
            body: String::new(),
        };
        let missing = Error::Status {
            code: 404,
            body: "not found".into(),
        };

        assert!(server.is_retryable());
        assert!(limited.is_retryable());
        assert!(!missing.is_retryable());
        assert!(Error::Timeout.is_retryable());
        assert!(!Error::InvalidParameter("x".into()).is_retryable());
        assert_eq!(missing.to_string(), "HTTP 404: not found");
    }

    #[test]
    fn test_websocket_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::from(tokio_tungstenite::tungstenite::Error::ConnectionClosed);
        assert!(matches!(err, Error::WebSocket(_)));
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("WebSocket error: "));
    }
}
