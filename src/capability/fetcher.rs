//! HTTP fetcher implementation
//!
//! This module provides the default fetch capability, including:
//! - Building HTTP clients with timeouts and compression
//! - Picking a user agent per request
//! - Optional random delay before each request
//! - Classifying failures as transient or permanent

use crate::capability::{FetchOutcome, Fetcher};
use crate::config::FetcherConfig;
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rand::Rng;
use reqwest::{header, redirect::Policy, Client, StatusCode};
use std::time::Duration;

/// User agent used when no list is configured
pub const DEFAULT_USER_AGENT: &str = concat!("tide-crawl/", env!("CARGO_PKG_VERSION"));

/// A fetched page, handed unchanged to the parse stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// HTTP status code
    pub status: u16,

    /// Final URL after redirects
    pub final_url: String,

    /// Content-Type header value (empty when absent)
    pub content_type: String,

    /// Page body content
    pub body: String,
}

/// How a single attempt went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Transient,
    Permanent,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetcher configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use tide_crawl::capability::build_http_client;
/// use tide_crawl::config::FetcherConfig;
///
/// let client = build_http_client(&FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetcherConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Default fetch capability backed by `reqwest`
pub struct HttpFetcher {
    client: Client,
    max_repeat: u32,
    sleep_time_ms: u64,
    user_agents: Vec<String>,
}

impl HttpFetcher {
    /// Creates a fetcher from configuration
    pub fn new(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(config)?, config))
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client, config: &FetcherConfig) -> Self {
        Self {
            client,
            max_repeat: config.max_repeat,
            sleep_time_ms: config.sleep_time_ms,
            user_agents: config.user_agents.clone(),
        }
    }

    /// Returns the retry ceiling
    pub fn max_repeat(&self) -> u32 {
        self.max_repeat
    }

    fn pick_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::rng())
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    fn jitter(&self) -> Duration {
        if self.sleep_time_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=self.sleep_time_ms))
    }

    /// Performs one GET request and classifies the response
    async fn url_fetch(&self, url: &str) -> Result<Page, (Fault, String)> {
        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, self.pick_user_agent())
            .send()
            .await
            .map_err(|e| (Fault::Transient, describe_request_error(&e)))?;

        let status = response.status();
        if let Some(fault) = classify_status(status) {
            return Err((fault, format!("HTTP {}", status.as_u16())));
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response
            .text()
            .await
            .map_err(|e| (Fault::Transient, e.to_string()))?;

        Ok(Page {
            status: status.as_u16(),
            final_url,
            content_type,
            body,
        })
    }
}

/// Maps an HTTP status to a fault, or `None` for success
///
/// | Status | Fault |
/// |--------|-------|
/// | 2xx | none |
/// | 408, 429, 5xx | Transient |
/// | anything else | Permanent |
fn classify_status(status: StatusCode) -> Option<Fault> {
    if status.is_success() {
        None
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        Some(Fault::Transient)
    } else {
        Some(Fault::Permanent)
    }
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        "Connection refused".to_string()
    } else {
        e.to_string()
    }
}

#[async_trait]
impl<K: Send + Sync> Fetcher<K, Page> for HttpFetcher {
    async fn fetch(&self, url: &str, _keys: &K, repeat_count: u32) -> FetchOutcome<Page> {
        tracing::debug!("Fetching {} (attempt {})", url, repeat_count + 1);

        let delay = self.jitter();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.url_fetch(url).await {
            Ok(page) => {
                tracing::debug!("Fetched {} ({} bytes)", url, page.body.len());
                FetchOutcome::Success(page)
            }
            Err((Fault::Permanent, reason)) => {
                tracing::warn!("Fetch failed permanently for {}: {}", url, reason);
                FetchOutcome::PermanentFailure
            }
            Err((Fault::Transient, reason)) if repeat_count >= self.max_repeat => {
                tracing::warn!(
                    "Giving up on {} after {} retries: {}",
                    url,
                    repeat_count,
                    reason
                );
                FetchOutcome::PermanentFailure
            }
            Err((Fault::Transient, reason)) => {
                tracing::info!("Transient fetch error for {}: {}", url, reason);
                FetchOutcome::RetryNeeded
            }
        }
    }
}
