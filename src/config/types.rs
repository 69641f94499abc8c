use serde::Deserialize;

/// Main configuration structure for Sumi-Crawl
///
/// Every table and key is optional in the TOML file; missing values fall back
/// to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub scope: ScopeConfig,
    pub politeness: PolitenessConfig,
    pub cache: CacheConfig,
    pub sitemap: SitemapConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawl shape, concurrency and budgets
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Seed URLs, crawled at depth 0
    pub seeds: Vec<String>,

    /// Maximum hop count from a seed; pages at this depth are fetched but not expanded
    pub max_depth: i64,

    /// Maximum number of simultaneously in-flight fetch tasks
    pub concurrency: u32,

    /// Minimum spacing between any two dispatches (milliseconds, 0 = none)
    pub dispatch_delay_ms: u64,

    /// Per-request timeout (seconds)
    pub fetch_timeout_secs: u64,

    /// TCP connect timeout (seconds)
    pub connect_timeout_secs: u64,

    /// Extra attempts after a retryable failure
    pub max_retries: u32,

    /// Base backoff before the first retry (milliseconds), doubled each attempt
    pub retry_backoff_ms: u64,

    /// Stop dispatching after this many pages
    pub max_requests: Option<u64>,

    /// Stop dispatching after this much wall-clock time (seconds)
    pub max_duration_secs: Option<u64>,

    /// Time allowed for in-flight tasks after cancellation (seconds)
    pub grace_period_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_depth: 3,
            concurrency: 10,
            dispatch_delay_ms: 0,
            fetch_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 0,
            retry_backoff_ms: 300,
            max_requests: None,
            max_duration_secs: None,
            grace_period_secs: 5,
        }
    }
}

/// Which hosts are followed
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScopeConfig {
    /// Follow links to any host
    pub allow_external: bool,

    /// Follow links to other hosts under the seed's registrable domain
    pub allow_subdomains: bool,
}

/// robots.txt and per-host rate limiting
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolitenessConfig {
    /// Minimum time between requests to the same host (milliseconds)
    pub request_delay_ms: u64,

    /// Skip robots.txt entirely (the per-host delay still applies)
    pub ignore_robots: bool,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 100,
            ignore_robots: false,
        }
    }
}

/// Response cache
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    pub enabled: bool,

    /// Keep the cache on disk across runs (otherwise in memory for this run only)
    pub persistent: bool,

    /// Directory holding the cache database
    pub directory: String,

    /// Record lifetime (seconds); zero or negative disables reuse
    pub ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persistent: true,
            directory: "./cache".to_string(),
            ttl_secs: 86_400,
        }
    }
}

/// Sitemap-based discovery
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SitemapConfig {
    pub enabled: bool,

    /// Child sitemaps fetched from a sitemap index
    pub max_subsitemaps: usize,

    /// Budget for the whole discovery phase (seconds)
    pub timeout_secs: u64,
}

impl Default for SitemapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_subsitemaps: 5,
            timeout_secs: 30,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler, also the token matched against robots.txt groups
    pub crawler_name: String,

    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact (may be empty)
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiCrawl".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/sumi-crawl".to_string(),
            contact_email: String::new(),
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        if self.contact_email.is_empty() {
            format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, self.contact_url
            )
        } else {
            format!(
                "{}/{} (+{}; {})",
                self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
            )
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Print a block per crawled page
    pub print_pages: bool,

    /// Write one JSON file per crawled page into this directory
    pub json_dir: Option<String>,

    /// Write a markdown run summary to this path
    pub summary_path: Option<String>,
}
