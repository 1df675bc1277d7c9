//! HTTP JSON fetching with exponential backoff retry logic.
//!
//! Every platform API the fetchers talk to returns JSON over GET. This module
//! provides a small trait-based layer for that:
//! - [`FetchJson`]: Core trait, fetch a URL and return the parsed body
//! - [`HttpJson`]: Implementation on top of a shared `reqwest::Client`
//! - [`RetryFetch`]: Decorator that retries transient failures of any `FetchJson`
//!
//! # Retry Strategy
//!
//! - Only errors classified by [`Error::is_transient`] are retried
//! - Exponential backoff starting at the base delay, capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::error::{Error, Result};
use rand::{Rng, rng};
use serde_json::Value;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Default number of retries for platform API calls.
pub const DEFAULT_MAX_RETRIES: usize = 4;

/// Trait for fetching a JSON document.
pub trait FetchJson {
    /// GET `url` and parse the body as JSON.
    async fn fetch_json(&self, url: &str) -> Result<Value>;
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchJson`] implementation.
///
/// # Backoff Strategy
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchJson,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> FetchJson for RetryFetch<T>
where
    T: FetchJson,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.fetch_json(url).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !e.is_transient() || attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "fetch_json() giving up"
                        );
                        return Err(e);
                    }

                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1).min(16));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "fetch_json() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// [`FetchJson`] over a shared `reqwest::Client`, with an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpJson {
    client: reqwest::Client,
    bearer: Option<String>,
}

impl HttpJson {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client, bearer: None }
    }

    pub fn with_bearer(client: reqwest::Client, token: String) -> Self {
        Self { client, bearer: Some(token) }
    }
}

impl FetchJson for HttpJson {
    async fn fetch_json(&self, url: &str) -> Result<Value> {
        let t0 = Instant::now();
        let mut request = self.client.get(url);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let value = response.json::<Value>().await?;
        debug!(elapsed_ms = t0.elapsed().as_millis(), %status, "Fetched JSON");
        Ok(value)
    }
}

/// An [`HttpJson`] wrapped in the default retry policy.
pub fn retrying(http: HttpJson) -> RetryFetch<HttpJson> {
    RetryFetch::new(http, DEFAULT_MAX_RETRIES, StdDuration::from_secs(1))
}
