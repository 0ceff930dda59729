//! Configuration for the chart API client.

use std::time::Duration;

/// Configuration for the REST client.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL for the REST API (default: http://localhost:8080).
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for failed requests.
    pub retry: RetryConfig,
    /// User agent string.
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: crate::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            user_agent: format!("chart-api-rust/{}", crate::VERSION),
        }
    }
}

impl Config {
    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Bounded retry policy for REST requests.
///
/// Transport errors, timeouts, 5xx and 429 responses are retried; other
/// statuses fail immediately.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Backoff multiplier applied per retry.
    pub backoff_multiplier: f64,
    /// Upper bound for a single backoff delay.
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Disable retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        scaled_delay(
            self.initial_backoff,
            self.backoff_multiplier,
            retry,
            self.max_backoff,
        )
    }
}

/// WebSocket configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL.
    pub url: String,
    /// Ping interval.
    pub ping_interval: Duration,
    /// Reconnect on disconnect.
    pub auto_reconnect: bool,
    /// Maximum reconnect attempts (`None` retries forever).
    pub max_reconnect_attempts: Option<u32>,
    /// Delay before the first reconnect attempt.
    pub reconnect_delay: Duration,
    /// Growth factor per consecutive failed attempt (1.0 keeps the delay fixed).
    pub backoff_multiplier: f64,
    /// Upper bound for the reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Channel buffer size.
    pub channel_buffer_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: crate::DEFAULT_WS_URL.to_string(),
            ping_interval: Duration::from_secs(30),
            auto_reconnect: true,
            max_reconnect_attempts: None,
            reconnect_delay: Duration::from_secs(5),
            backoff_multiplier: 1.0,
            max_reconnect_delay: Duration::from_secs(60),
            channel_buffer_size: 1000,
        }
    }
}

impl WsConfig {
    /// Create a WebSocket config with custom URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the ping interval.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set auto reconnect behavior.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the reconnect delay and backoff growth.
    pub fn with_reconnect_backoff(
        mut self,
        delay: Duration,
        multiplier: f64,
        max: Duration,
    ) -> Self {
        self.reconnect_delay = delay;
        self.backoff_multiplier = multiplier;
        self.max_reconnect_delay = max;
        self
    }

    /// Limit the number of consecutive reconnect attempts.
    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the channel buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        scaled_delay(
            self.reconnect_delay,
            self.backoff_multiplier,
            attempt.saturating_sub(1),
            self.max_reconnect_delay,
        )
    }
}

fn scaled_delay(base: Duration, multiplier: f64, exponent: u32, cap: Duration) -> Duration {
    let factor = multiplier.max(1.0).powi(exponent.min(i32::MAX as u32) as i32);
    let secs = base.as_secs_f64() * factor;
    if !secs.is_finite() || secs >= cap.as_secs_f64() {
        cap
    } else {
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reconnect_is_fixed_five_seconds() {
        let config = WsConfig::default();
        for attempt in 1..10 {
            assert_eq!(config.reconnect_backoff(attempt), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_exponential_reconnect_is_capped() {
        let config = WsConfig::default().with_reconnect_backoff(
            Duration::from_secs(1),
            2.0,
            Duration::from_secs(10),
        );
        assert_eq!(config.reconnect_backoff(1), Duration::from_secs(1));
        assert_eq!(config.reconnect_backoff(2), Duration::from_secs(2));
        assert_eq!(config.reconnect_backoff(4), Duration::from_secs(8));
        assert_eq!(config.reconnect_backoff(5), Duration::from_secs(10));
        assert_eq!(config.reconnect_backoff(500), Duration::from_secs(10));
    }

    #[test]
    fn test_retry_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(0), Duration::from_millis(500));
        assert_eq!(retry.backoff(1), Duration::from_millis(1000));
        assert_eq!(retry.backoff(2), Duration::from_millis(2000));
        assert_eq!(retry.backoff(10), Duration::from_secs(5));
        assert_eq!(RetryConfig::disabled().max_retries, 0);
    }
}
