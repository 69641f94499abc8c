//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic
//! - HTML parsing and link extraction
//! - The breadth-first frontier and dispatch scheduling
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod scheduler;
mod task;

pub use coordinator::Coordinator;
pub use fetcher::{
    build_http_client, fetch_following_redirects, is_html_content_type, HttpResponse,
    HttpTransport, RetryPolicy, Transport, TransportError, MAX_REDIRECTS,
};
pub use frontier::{Frontier, FrontierEntry, Offer};
pub use parser::{extract_links, parse_page, ParsedPage};
pub use scheduler::{CrawlState, Scheduler, SchedulerLimits, StopReason};

use crate::config::Config;
use crate::output::{CrawlSummary, ResultSink};
use crate::SumiError;
use std::sync::Arc;

/// Runs a complete crawl over HTTP
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Validate the configuration and open the response cache
/// 2. Build the HTTP client
/// 3. Schedule and fetch pages, following links breadth-first
/// 4. Report every page to `sink`
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `sink` - Receives one result per finished page
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Crawl finished or was stopped early
/// * `Err(SumiError)` - The configuration was rejected
pub async fn crawl(config: Config, sink: Arc<dyn ResultSink>) -> Result<CrawlSummary, SumiError> {
    Coordinator::new(config, sink)?.run().await
}
