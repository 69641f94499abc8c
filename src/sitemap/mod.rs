//! Sitemap discovery
//!
//! Discovery runs as its own task and streams URLs to the coordinator over a
//! channel while the crawl proceeds. The channel closes when discovery
//! finishes, fails, or runs out of time; URLs sent before that stay valid.

mod parser;

pub use parser::{parse_sitemap, SitemapDocument};

use crate::crawler::{fetch_following_redirects, Transport, TransportError};
use crate::url::{normalize, CanonicalUrl};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

/// Buffered URLs between discovery and the coordinator
const CHANNEL_CAPACITY: usize = 256;

/// Sitemap-specific errors
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("Failed to fetch sitemap: {0}")]
    Fetch(#[from] TransportError),

    #[error("Sitemap {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Malformed sitemap XML: {0}")]
    Parse(String),
}

/// A page URL found in a sitemap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredUrl {
    pub url: CanonicalUrl,

    /// The sitemap that listed it
    pub sitemap: String,
}

/// Limits for one discovery run
#[derive(Debug, Clone, Copy)]
pub struct DiscoverySettings {
    /// Child sitemaps fetched from an index
    pub max_subsitemaps: usize,

    /// Budget for the whole discovery phase
    pub timeout: Duration,

    /// Timeout for each sitemap request
    pub fetch_timeout: Duration,
}

/// Returns `{scheme}://{host[:port]}/sitemap.xml` for a seed
pub fn sitemap_root(seed: &Url) -> Url {
    let mut root = seed.clone();
    root.set_path("/sitemap.xml");
    root.set_query(None);
    root.set_fragment(None);
    root
}

/// Starts discovery from `root` and returns the receiving end
///
/// Must be called inside a tokio runtime.
pub fn discover(
    transport: Arc<dyn Transport>,
    root: Url,
    settings: DiscoverySettings,
) -> mpsc::Receiver<DiscoveredUrl> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let started = tokio::time::Instant::now();
        let outcome = tokio::time::timeout(
            settings.timeout,
            run_discovery(transport.as_ref(), &root, settings, &tx),
        )
        .await;

        match outcome {
            Ok(sent) => tracing::info!(
                "Sitemap discovery finished: {} URLs in {:.1}s",
                sent,
                started.elapsed().as_secs_f64()
            ),
            Err(_) => tracing::warn!(
                "Sitemap discovery timed out after {:?}, keeping URLs found so far",
                settings.timeout
            ),
        }
    });

    rx
}

/// Fetches and parses one sitemap
pub async fn fetch_sitemap(
    transport: &dyn Transport,
    url: &Url,
    timeout: Duration,
) -> Result<SitemapDocument, SitemapError> {
    let response = fetch_following_redirects(transport, url, timeout).await?;
    if !response.is_success() {
        return Err(SitemapError::Status {
            url: url.to_string(),
            status: response.status_code,
        });
    }
    parse_sitemap(response.body.as_bytes())
}

/// Walks the root sitemap and up to `max_subsitemaps` children
///
/// Returns the number of URLs sent.
async fn run_discovery(
    transport: &dyn Transport,
    root: &Url,
    settings: DiscoverySettings,
    tx: &mpsc::Sender<DiscoveredUrl>,
) -> usize {
    let document = match fetch_sitemap(transport, root, settings.fetch_timeout).await {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!("No usable sitemap at {}: {}", root, e);
            return 0;
        }
    };

    let Some(mut sent) = send_urls(&document.urls, root, tx).await else {
        return 0;
    };

    if document.child_sitemaps.len() > settings.max_subsitemaps {
        tracing::info!(
            "Sitemap index lists {} sitemaps, fetching the first {}",
            document.child_sitemaps.len(),
            settings.max_subsitemaps
        );
    }

    for child in document.child_sitemaps.iter().take(settings.max_subsitemaps) {
        let Ok(child_url) = Url::parse(child) else {
            tracing::warn!("Skipping invalid sitemap URL: {}", child);
            continue;
        };

        match fetch_sitemap(transport, &child_url, settings.fetch_timeout).await {
            Ok(child_doc) => {
                if child_doc.is_index() {
                    tracing::debug!("Ignoring nested sitemap index at {}", child_url);
                }
                match send_urls(&child_doc.urls, &child_url, tx).await {
                    Some(n) => sent += n,
                    None => return sent,
                }
            }
            Err(e) => tracing::warn!("Skipping sitemap {}: {}", child_url, e),
        }
    }

    sent
}

/// Sends normalized URLs; `None` once the receiver has gone away
///
/// Entries go through the same normalization as page links, so binary
/// resources and other schemes never reach the frontier.
async fn send_urls(
    urls: &[String],
    sitemap: &Url,
    tx: &mpsc::Sender<DiscoveredUrl>,
) -> Option<usize> {
    let mut sent = 0;
    for raw in urls {
        let url = match normalize(raw, sitemap) {
            Ok(url) => url,
            Err(rejection) => {
                tracing::debug!("Skipping sitemap entry {}: {}", raw, rejection);
                continue;
            }
        };

        let discovered = DiscoveredUrl {
            url,
            sitemap: sitemap.to_string(),
        };
        if tx.send(discovered).await.is_err() {
            tracing::debug!("Crawl no longer accepting sitemap URLs");
            return None;
        }
        sent += 1;
    }
    Some(sent)
}
