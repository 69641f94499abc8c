//! Sumi-Crawl main entry point
//!
//! This is the command-line interface for the Sumi-Crawl web crawler.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use sumi_crawl::cache::ResponseCache;
use sumi_crawl::config::{load_config, validate, Config};
use sumi_crawl::output::{build_sink, print_summary, write_markdown_summary};
use sumi_crawl::{Coordinator, CrawlState};
use tracing_subscriber::EnvFilter;

/// Exit code for a run stopped by Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

/// Sumi-Crawl: a polite, bounded-depth web crawler
///
/// Sumi-Crawl crawls breadth-first from the given seed URLs while respecting
/// robots.txt and per-host rate limits. Responses are cached between runs.
#[derive(Parser, Debug)]
#[command(name = "sumi-crawl")]
#[command(version)]
#[command(about = "A polite, bounded-depth web crawler", long_about = None)]
struct Cli {
    /// Seed URLs (added to any seeds from the config file)
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    /// Path to TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum link depth from the seeds
    #[arg(short, long)]
    depth: Option<i64>,

    /// Maximum concurrent fetches
    #[arg(short, long)]
    concurrency: Option<u32>,

    /// Follow links to other domains
    #[arg(long)]
    allow_external: bool,

    /// Follow links to subdomains of the seed domain
    #[arg(long)]
    allow_subdomains: bool,

    /// Disable the response cache
    #[arg(long)]
    no_cache: bool,

    /// Directory of the persistent response cache
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<String>,

    /// Cache entry lifetime in seconds
    #[arg(long, value_name = "SECS", allow_hyphen_values = true)]
    cache_ttl: Option<i64>,

    /// Delete every cached response and exit
    #[arg(long, conflicts_with = "dry_run")]
    clear_cache: bool,

    /// Minimum delay between requests to the same host, in milliseconds
    #[arg(long, value_name = "MS")]
    delay: Option<u64>,

    /// Minimum delay between any two dispatches, in milliseconds
    #[arg(long, value_name = "MS")]
    dispatch_delay: Option<u64>,

    /// Do not fetch or obey robots.txt
    #[arg(long)]
    ignore_robots: bool,

    /// Seed the crawl from the site's sitemap.xml
    #[arg(long)]
    use_sitemap: bool,

    /// Maximum child sitemaps read from a sitemap index
    #[arg(long, value_name = "N")]
    max_subsitemaps: Option<usize>,

    /// Time limit for sitemap discovery, in seconds
    #[arg(long, value_name = "SECS")]
    sitemap_timeout: Option<u64>,

    /// Retries for timeouts, connection errors, 429 and 5xx responses
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Stop dispatching after this many fetches
    #[arg(long, value_name = "N")]
    max_requests: Option<u64>,

    /// Stop dispatching after this many seconds
    #[arg(long, value_name = "SECS")]
    max_duration: Option<u64>,

    /// Write one JSON file per page into this directory
    #[arg(long, value_name = "DIR")]
    output_dir: Option<String>,

    /// Print one line per page
    #[arg(long)]
    print_pages: bool,

    /// Write a markdown summary to this file
    #[arg(long, value_name = "FILE")]
    summary: Option<String>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_crawl=info,warn"),
            1 => EnvFilter::new("sumi_crawl=debug,info"),
            2 => EnvFilter::new("sumi_crawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = build_config(&cli)?;

    if cli.clear_cache {
        handle_clear_cache(&config).await?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(ExitCode::SUCCESS);
    }

    handle_crawl(config).await
}

/// Loads the config file (or defaults) and applies command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?
        }
        None => Config::default(),
    };

    apply_overrides(&mut config, cli);

    validate(&config).context("invalid configuration")?;
    if config.crawler.seeds.is_empty() {
        anyhow::bail!("no seed URLs given; pass at least one URL or set crawler.seeds");
    }

    Ok(config)
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    config.crawler.seeds.extend(cli.urls.iter().cloned());

    if let Some(depth) = cli.depth {
        config.crawler.max_depth = depth;
    }
    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
    }
    if let Some(dispatch_delay) = cli.dispatch_delay {
        config.crawler.dispatch_delay_ms = dispatch_delay;
    }
    if let Some(max_retries) = cli.max_retries {
        config.crawler.max_retries = max_retries;
    }
    if cli.max_requests.is_some() {
        config.crawler.max_requests = cli.max_requests;
    }
    if cli.max_duration.is_some() {
        config.crawler.max_duration_secs = cli.max_duration;
    }

    config.scope.allow_external |= cli.allow_external;
    config.scope.allow_subdomains |= cli.allow_subdomains;

    if let Some(delay) = cli.delay {
        config.politeness.request_delay_ms = delay;
    }
    config.politeness.ignore_robots |= cli.ignore_robots;

    if cli.no_cache {
        config.cache.enabled = false;
    }
    if let Some(dir) = &cli.cache_dir {
        config.cache.directory = dir.clone();
    }
    if let Some(ttl) = cli.cache_ttl {
        config.cache.ttl_secs = ttl;
    }

    config.sitemap.enabled |= cli.use_sitemap;
    if let Some(max) = cli.max_subsitemaps {
        config.sitemap.max_subsitemaps = max;
    }
    if let Some(timeout) = cli.sitemap_timeout {
        config.sitemap.timeout_secs = timeout;
    }

    config.output.print_pages |= cli.print_pages;
    if cli.output_dir.is_some() {
        config.output.json_dir = cli.output_dir.clone();
    }
    if cli.summary.is_some() {
        config.output.summary_path = cli.summary.clone();
    }
}

/// Handles --clear-cache: empties the response cache
async fn handle_clear_cache(config: &Config) -> anyhow::Result<()> {
    let cache_config = config.cache.clone();
    let removed = tokio::task::spawn_blocking(move || {
        ResponseCache::from_config(&cache_config, 1)?.clear()
    })
    .await
    .context("cache task failed")?
    .context("failed to clear cache")?;
    println!("✓ Removed {} cached responses", removed);
    Ok(())
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Crawl Dry Run ===\n");

    println!("Seeds ({}):", config.crawler.seeds.len());
    for seed in &config.crawler.seeds {
        println!("  * {}", seed);
    }

    println!("\nCrawler Configuration:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Fetch timeout: {}s", config.crawler.fetch_timeout_secs);
    println!("  Max retries: {}", config.crawler.max_retries);
    if let Some(max) = config.crawler.max_requests {
        println!("  Max requests: {}", max);
    }
    if let Some(secs) = config.crawler.max_duration_secs {
        println!("  Max duration: {}s", secs);
    }

    println!("\nScope:");
    println!("  External domains: {}", config.scope.allow_external);
    println!("  Subdomains: {}", config.scope.allow_subdomains);

    println!("\nPoliteness:");
    println!("  Request delay: {}ms", config.politeness.request_delay_ms);
    println!("  Obey robots.txt: {}", !config.politeness.ignore_robots);
    println!("  User agent: {}", config.user_agent.header_value());

    println!("\nCache:");
    if config.cache.enabled {
        println!(
            "  {} (ttl {}s)",
            if config.cache.persistent {
                config.cache.directory.as_str()
            } else {
                "in memory"
            },
            config.cache.ttl_secs
        );
    } else {
        println!("  disabled");
    }

    if config.sitemap.enabled {
        println!("\nSitemap:");
        println!("  Max sub-sitemaps: {}", config.sitemap.max_subsitemaps);
        println!("  Timeout: {}s", config.sitemap.timeout_secs);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<ExitCode> {
    let summary_path = config.output.summary_path.clone();
    let sink = build_sink(&config.output).context("failed to set up output")?;
    let coordinator = Coordinator::new(config, sink).context("failed to start crawler")?;

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping crawl");
            token.cancel();
        }
    });

    let summary = coordinator.run().await.context("crawl failed")?;
    print_summary(&summary);

    if let Some(path) = summary_path {
        write_markdown_summary(&summary, Path::new(&path))
            .with_context(|| format!("failed to write summary to {}", path))?;
        println!("✓ Summary written to: {}", path);
    }

    let interrupted =
        summary.state == CrawlState::Cancelled && coordinator.cancellation_token().is_cancelled();
    Ok(if interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    })
}
