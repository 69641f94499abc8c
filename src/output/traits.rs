//! Result sink trait and types
//!
//! This module defines the trait interface for result sinks and the data
//! structures handed to them: one `CrawlResult` per finished URL, and the
//! `CrawlSummary` of a whole run.

use crate::crawler::CrawlState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while emitting results
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize result: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// How a URL finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStatus {
    /// Fetched from the network with a 2xx status
    Fetched,

    /// Served from the response cache
    Cached,

    /// Network error, timeout or non-2xx status after all retries
    Failed,

    /// Refused by robots.txt
    Denied,

    /// Answered with a redirect to a different URL, which is queued separately
    Redirected,
}

impl CrawlStatus {
    /// Returns true for pages that produced content
    pub fn is_success(&self) -> bool {
        matches!(self, CrawlStatus::Fetched | CrawlStatus::Cached)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlStatus::Fetched => "fetched",
            CrawlStatus::Cached => "cached",
            CrawlStatus::Failed => "failed",
            CrawlStatus::Denied => "denied",
            CrawlStatus::Redirected => "redirected",
        }
    }
}

/// Everything known about one crawled URL
#[derive(Debug, Clone, Serialize)]
pub struct CrawlResult {
    /// Canonical URL that was crawled
    pub url: String,

    /// Hops from the nearest seed (sitemap URLs count as depth 0)
    pub depth: u32,

    /// Page or sitemap the URL was first found on; `None` for seeds
    pub discovered_from: Option<String>,

    pub status: CrawlStatus,

    pub status_code: Option<u16>,

    pub title: Option<String>,

    /// `<meta>` name/property values
    pub metadata: BTreeMap<String, String>,

    /// Response body for successful pages
    #[serde(skip)]
    pub content: Option<String>,

    /// Failure description for failed pages
    pub error: Option<String>,

    /// Canonical redirect target for redirected pages
    pub redirect_to: Option<String>,

    /// In-scope canonical links found on the page, in document order
    pub links: Vec<String>,

    /// Network attempts made (0 for cache hits and denials)
    pub attempts: u32,

    pub completed_at: DateTime<Utc>,
}

impl CrawlResult {
    /// A result with no content, ready to be filled in
    pub fn new(url: impl Into<String>, depth: u32, status: CrawlStatus) -> Self {
        Self {
            url: url.into(),
            depth,
            discovered_from: None,
            status,
            status_code: None,
            title: None,
            metadata: BTreeMap::new(),
            content: None,
            error: None,
            redirect_to: None,
            links: Vec::new(),
            attempts: 0,
            completed_at: Utc::now(),
        }
    }
}

/// Trait for result sinks
///
/// Sinks are called from the coordinator loop, one result at a time, and must
/// return promptly. Implementations must be thread-safe.
pub trait ResultSink: Send + Sync {
    /// Records one finished URL
    fn emit(&self, result: &CrawlResult) -> SinkResult<()>;
}

/// Summary statistics for a crawl run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    /// Terminal state of the run
    pub state: CrawlState,

    /// Successful pages, cache hits included
    pub fetched: u64,

    /// Successful pages served from the cache
    pub from_cache: u64,

    pub failed: u64,

    /// Pages refused by robots.txt
    pub skipped: u64,

    /// Pages that redirected elsewhere
    pub redirected: u64,

    /// In-flight pages dropped by cancellation
    pub abandoned: u64,

    /// URLs dispatched to fetch tasks
    pub total_urls: u64,

    /// URLs accepted into the frontier (seeds included)
    pub discovered: u64,

    pub sitemap_urls_found: u64,

    /// Sitemap URLs accepted into the frontier
    pub sitemap_urls_used: u64,

    pub sink_errors: u64,

    /// Finished pages per depth
    pub depth_breakdown: BTreeMap<u32, u64>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
}

impl CrawlSummary {
    /// Creates an empty summary for a run starting now
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            state: CrawlState::Idle,
            fetched: 0,
            from_cache: 0,
            failed: 0,
            skipped: 0,
            redirected: 0,
            abandoned: 0,
            total_urls: 0,
            discovered: 0,
            sitemap_urls_found: 0,
            sitemap_urls_used: 0,
            sink_errors: 0,
            depth_breakdown: BTreeMap::new(),
            started_at: now,
            finished_at: now,
            duration: Duration::ZERO,
        }
    }

    /// Counts one finished URL
    pub fn record(&mut self, status: CrawlStatus, depth: u32) {
        match status {
            CrawlStatus::Fetched => self.fetched += 1,
            CrawlStatus::Cached => {
                self.fetched += 1;
                self.from_cache += 1;
            }
            CrawlStatus::Failed => self.failed += 1,
            CrawlStatus::Denied => self.skipped += 1,
            CrawlStatus::Redirected => self.redirected += 1,
        }
        *self.depth_breakdown.entry(depth).or_insert(0) += 1;
    }

    /// Stamps the end of the run
    pub fn finish(&mut self, state: CrawlState, elapsed: Duration) {
        self.state = state;
        self.finished_at = Utc::now();
        self.duration = elapsed;
    }

    /// Pages that reached a terminal status
    pub fn completed(&self) -> u64 {
        self.fetched + self.failed + self.skipped + self.redirected
    }

    /// Returns the success rate as a percentage of completed pages
    pub fn success_rate(&self) -> f64 {
        let completed = self.completed();
        if completed == 0 {
            return 0.0;
        }
        (self.fetched as f64 / completed as f64) * 100.0
    }

    /// Returns the cache hit rate as a percentage of successful pages
    pub fn cache_hit_rate(&self) -> f64 {
        if self.fetched == 0 {
            return 0.0;
        }
        (self.from_cache as f64 / self.fetched as f64) * 100.0
    }
}

impl Default for CrawlSummary {
    fn default() -> Self {
        Self::new()
    }
}
