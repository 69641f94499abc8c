//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - The `Transport` seam the crawl engine fetches through
//! - Building HTTP clients with proper user agent strings
//! - Error classification
//! - Redirect detection (clients never follow redirects on their own)
//! - The retry policy applied by fetch tasks

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed for one URL
pub const MAX_REDIRECTS: usize = 10;

/// Cap on a single retry backoff
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Network-level failure while fetching a URL
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP error for {url}: {message}")]
    Request { url: String, message: String },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },
}

/// A fetched HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// URL the response was served from
    pub final_url: String,

    pub status_code: u16,

    /// Response headers with lowercased names
    pub headers: BTreeMap<String, String>,

    pub body: String,
}

impl HttpResponse {
    /// Returns true for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }

    /// The Location of a 301, 302, 303, 307 or 308 response
    pub fn redirect_location(&self) -> Option<&str> {
        match self.status_code {
            301 | 302 | 303 | 307 | 308 => self.headers.get("location").map(String::as_str),
            _ => None,
        }
    }
}

/// Fetches `url`, following up to [`MAX_REDIRECTS`] redirects
///
/// Used for robots.txt and sitemaps, which are not subject to crawl scope.
/// Pages go through the fetch task instead, which checks every hop.
pub async fn fetch_following_redirects(
    transport: &dyn Transport,
    url: &Url,
    timeout: Duration,
) -> Result<HttpResponse, TransportError> {
    let mut target = url.clone();
    for _ in 0..=MAX_REDIRECTS {
        let response = transport.fetch(&target, timeout).await?;
        let Some(location) = response.redirect_location() else {
            return Ok(response);
        };
        target = target.join(location).map_err(|e| TransportError::Request {
            url: target.to_string(),
            message: format!("bad redirect location {:?}: {}", location, e),
        })?;
        tracing::trace!("Following redirect to {}", target);
    }

    Err(TransportError::Request {
        url: url.to_string(),
        message: "too many redirects".to_string(),
    })
}

/// Returns true when a Content-Type (or its absence) may hold HTML
pub fn is_html_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => ct.to_ascii_lowercase().contains("html"),
        None => true,
    }
}

/// Issues GET requests on behalf of the crawl engine
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url`, giving up after `timeout`
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, TransportError>;
}

/// Builds an HTTP client with proper configuration
///
/// The User-Agent is formatted as `CrawlerName/Version (+ContactURL; ContactEmail)`.
///
/// # Example
///
/// ```no_run
/// use sumi_crawl::config::UserAgentConfig;
/// use sumi_crawl::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    connect_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static("en-US,en;q=0.5"),
    );

    Client::builder()
        .user_agent(config.header_value())
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// `Transport` backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a transport from the user agent block
    pub fn from_config(
        config: &UserAgentConfig,
        connect_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        build_http_client(config, connect_timeout).map(Self::new)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: url.to_string(),
                }
            } else {
                TransportError::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        Ok(HttpResponse {
            final_url,
            status_code,
            headers,
            body,
        })
    }
}

/// Maps a reqwest error onto the transport taxonomy
fn classify_error(url: &Url, error: reqwest::Error) -> TransportError {
    let url = url.to_string();
    if error.is_timeout() {
        TransportError::Timeout { url }
    } else if error.is_connect() {
        TransportError::Connect {
            url,
            message: error.to_string(),
        }
    } else {
        TransportError::Request {
            url,
            message: error.to_string(),
        }
    }
}

/// Bounded retry with exponential backoff
///
/// | Condition | Action |
/// |-----------|--------|
/// | Transport error (timeout, connect, body) | Retry |
/// | HTTP 429, 500, 502, 503, 504 | Retry |
/// | Any other non-2xx | Immediate failure |
///
/// The wait before retry `n` (1-based) is `backoff * 2^(n-1)`, capped at 30s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Returns true if another attempt is allowed after `attempts` attempts
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    /// Returns true if this status is worth another attempt
    pub fn is_retryable_status(status_code: u16) -> bool {
        matches!(status_code, 429 | 500 | 502 | 503 | 504)
    }

    /// Wait before the next attempt, given the attempts made so far
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.backoff
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
