//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the pipeline:
//! - Building the shared HTTP client (user agent, timeouts, pool size)
//! - Single GET requests with status and transport error classification
//! - Retry with exponential backoff through [`RetryPolicy`]
//! - Holding a [`ConcurrencyBudget`] permit for page fetches

use crate::config::HttpConfig;
use crate::crawler::budget::ConcurrencyBudget;
use crate::crawler::retry::RetryPolicy;
use crate::{FetchError, HarvestError};
use reqwest::{Client, Response};
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use image_harvest::config::HttpConfig;
/// use image_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages and opens download streams
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | Status in the retry set | Retry with backoff |
/// | Other non-2xx status | Immediate failure |
/// | Timeout | Retry with backoff (configurable) |
/// | Connection / transport error | Retry with backoff (configurable) |
/// | Invalid URL | Immediate failure |
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    budget: ConcurrencyBudget,
}

impl Fetcher {
    pub fn new(client: Client, policy: RetryPolicy, budget: ConcurrencyBudget) -> Self {
        Self {
            client,
            policy,
            budget,
        }
    }

    pub fn budget(&self) -> &ConcurrencyBudget {
        &self.budget
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches a page body as text
    ///
    /// Holds one budget permit for the whole call, including backoff sleeps.
    /// The permit is released when this future completes or is dropped.
    pub async fn fetch(&self, url: &str) -> Result<String, HarvestError> {
        let _permit = self.budget.acquire().await?;

        let body = self
            .policy
            .run(url, move || async move {
                let response = self.get_once(url).await?;
                response
                    .text()
                    .await
                    .map_err(|e| FetchError::from_reqwest(url, e))
            })
            .await?;

        tracing::trace!("Fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }

    /// Sends a GET with retry and returns the response for streaming
    ///
    /// Does not take a budget permit; the caller holds one for the whole
    /// transfer.
    pub async fn send(&self, url: &str) -> Result<Response, FetchError> {
        self.policy.run(url, move || self.get_once(url)).await
    }

    /// A single GET; non-2xx statuses become [`FetchError::Status`]
    async fn get_once(&self, url: &str) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}
