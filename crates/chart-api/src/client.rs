//! HTTP client for the candles REST API.

use reqwest::{Client, Response};
use std::sync::Arc;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::{CandleDto, CandlesResponse};

/// HTTP client for making requests to the chart REST API.
#[derive(Debug, Clone)]
pub struct ChartClient {
    config: Arc<Config>,
    http: Client,
}

impl ChartClient {
    /// Create a new client with the given configuration.
    pub fn new(config: Config) -> Result<Self> {
        // Reject bad base URLs up front instead of on the first fetch.
        Url::parse(&config.base_url)?;

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the candles URL.
    ///
    /// `instrument` is percent-encoded as a single path segment, so symbols
    /// like `BTC/USD` stay one segment.
    pub fn candles_url(
        &self,
        instrument: &str,
        timeframe: &str,
        limit: u32,
        to: Option<i64>,
    ) -> Result<Url> {
        if instrument.is_empty() {
            return Err(Error::InvalidParameter("instrument is empty".to_string()));
        }

        let mut url = Url::parse(&self.config.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidParameter("base URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["api", "candles", instrument, timeframe]);

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(to) = to {
                query.append_pair("to", &to.to_string());
            }
        }

        Ok(url)
    }

    /// Fetch up to `limit` candles, ending before `to` when given, sorted by
    /// time ascending.
    pub async fn candles(
        &self,
        instrument: &str,
        timeframe: &str,
        limit: u32,
        to: Option<i64>,
    ) -> Result<Vec<CandleDto>> {
        let url = self.candles_url(instrument, timeframe, limit, to)?;
        let response: CandlesResponse = self.get(url).await?;
        Ok(response.into_sorted())
    }

    /// GET a JSON document, retrying per the configured retry policy.
    pub async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let retry = &self.config.retry;
        let mut retries = 0;

        loop {
            let result = match self.http.get(url.clone()).send().await {
                Ok(response) => self.handle_response(response).await,
                Err(e) => Err(Error::from(e)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < retry.max_retries => {
                    let wait = retry.backoff(retries);
                    tracing::warn!(
                        "Request to {} failed ({}), retry {}/{} in {:?}",
                        url.path(),
                        e,
                        retries + 1,
                        retry.max_retries,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Handle the API response.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Status {
                code: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            let head: String = body.chars().take(200).collect();
            tracing::error!("Failed to parse response: {}", head);
            Error::Json(e)
        })
    }
}
