//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop. A single task owns the frontier
//! and the scheduler and multiplexes, with `tokio::select!`:
//! - cancellation and the wall-clock budget
//! - completions of in-flight fetch tasks
//! - URLs streamed in by sitemap discovery
//! - the global dispatch spacing timer
//!
//! Fetch tasks never mutate shared crawl state; everything they discover comes
//! back through their outcome and is deduplicated here.

use crate::cache::ResponseCache;
use crate::config::{validate, CacheConfig, Config};
use crate::crawler::fetcher::{HttpTransport, RetryPolicy, Transport};
use crate::crawler::frontier::{Frontier, Offer};
use crate::crawler::scheduler::{CrawlState, Scheduler, SchedulerLimits, StopReason};
use crate::crawler::task::{process_entry, ScopeRules, TaskContext, TaskOutcome};
use crate::output::{CrawlSummary, ResultSink};
use crate::politeness::{GateSettings, PolitenessGate};
use crate::sitemap::{discover, sitemap_root, DiscoveredUrl, DiscoverySettings};
use crate::url::{normalize_url, CanonicalUrl};
use crate::{ConfigError, SumiError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Upper bound on SQLite cache connections
const MAX_CACHE_CONNECTIONS: u32 = 8;

/// Completed pages between progress log lines
const PROGRESS_INTERVAL: u64 = 10;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    cache: Arc<ResponseCache>,
    sink: Arc<dyn ResultSink>,
    cancel: CancellationToken,
}

/// Mutable state of one run, owned by the loop
struct CrawlRun {
    frontier: Frontier,
    scheduler: Scheduler,
    summary: CrawlSummary,
    completed: u64,
    started: Instant,
}

impl Coordinator {
    /// Creates a coordinator that fetches over HTTP
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(SumiError)` - Invalid configuration or HTTP client setup failure
    pub fn new(config: Config, sink: Arc<dyn ResultSink>) -> Result<Self, SumiError> {
        let connect_timeout = Duration::from_secs(config.crawler.connect_timeout_secs);
        let transport = HttpTransport::from_config(&config.user_agent, connect_timeout)?;
        Self::with_transport(config, Arc::new(transport), sink)
    }

    /// Creates a coordinator over an arbitrary transport
    pub fn with_transport(
        config: Config,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self, SumiError> {
        validate(&config)?;

        let connections = config.crawler.concurrency.clamp(1, MAX_CACHE_CONNECTIONS) as usize;
        let cache = open_cache(&config.cache, connections);

        Ok(Self {
            config: Arc::new(config),
            transport,
            cache: Arc::new(cache),
            sink,
            cancel: CancellationToken::new(),
        })
    }

    /// Replaces the response cache built from the configuration
    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    /// Token that stops the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the crawl to completion or cancellation
    ///
    /// Only configuration problems are errors. Page failures, sink failures
    /// and cache failures are counted in the returned summary.
    pub async fn run(&self) -> Result<CrawlSummary, SumiError> {
        let crawler = &self.config.crawler;
        let seeds = parse_seeds(&crawler.seeds)?;
        let max_depth = u32::try_from(crawler.max_depth).map_err(|_| {
            ConfigError::Validation(format!("max_depth out of range: {}", crawler.max_depth))
        })?;

        let mut run = CrawlRun {
            frontier: Frontier::new(max_depth),
            scheduler: Scheduler::new(SchedulerLimits {
                concurrency: crawler.concurrency as usize,
                dispatch_delay: Duration::from_millis(crawler.dispatch_delay_ms),
                max_requests: crawler.max_requests,
                max_duration: crawler.max_duration_secs.map(Duration::from_secs),
            }),
            summary: CrawlSummary::new(),
            completed: 0,
            started: Instant::now(),
        };

        for seed in &seeds {
            if run.frontier.offer(seed.clone(), 0, None) == Offer::Enqueued {
                run.summary.discovered += 1;
            }
        }

        let task_token = self.cancel.child_token();
        let ctx = Arc::new(self.task_context(&seeds, max_depth, task_token.clone()));

        let mut sitemap_rx = self.start_sitemap_discovery(&seeds);

        tracing::info!(
            "Starting crawl: {} seed(s), max depth {}, concurrency {}",
            seeds.len(),
            max_depth,
            crawler.concurrency
        );
        run.scheduler.start(run.started);

        let grace = Duration::from_secs(crawler.grace_period_secs);
        let mut tasks: JoinSet<TaskOutcome> = JoinSet::new();
        let mut next_dispatch: Option<Instant> = None;
        let mut grace_deadline: Option<Instant> = None;

        loop {
            if run.scheduler.state().is_active() {
                if self.cancel.is_cancelled() {
                    stop(
                        &mut run,
                        StopReason::Interrupted,
                        grace,
                        &mut grace_deadline,
                        &mut sitemap_rx,
                    );
                } else if run.scheduler.deadline().is_some_and(|d| Instant::now() >= d) {
                    stop(
                        &mut run,
                        StopReason::Deadline,
                        grace,
                        &mut grace_deadline,
                        &mut sitemap_rx,
                    );
                }
            }

            if run.scheduler.state().is_active() && next_dispatch.is_none() {
                while run.scheduler.has_capacity() && !run.frontier.is_empty() {
                    if run.scheduler.budget_exhausted() {
                        stop(
                            &mut run,
                            StopReason::RequestBudget,
                            grace,
                            &mut grace_deadline,
                            &mut sitemap_rx,
                        );
                        break;
                    }

                    let now = Instant::now();
                    if let Some(wait) = run.scheduler.dispatch_wait(now) {
                        next_dispatch = Some(now + wait);
                        break;
                    }

                    let Some(entry) = run.frontier.pop() else {
                        break;
                    };
                    tracing::debug!("Dispatching {} (depth {})", entry.url, entry.depth);
                    run.scheduler.record_dispatch(now);
                    tasks.spawn(process_entry(Arc::clone(&ctx), entry));
                }
            }

            run.scheduler.update(!run.frontier.is_empty(), sitemap_rx.is_some());

            match run.scheduler.state() {
                CrawlState::Done => break,
                CrawlState::Cancelled if tasks.is_empty() => break,
                _ => {}
            }

            let deadline = run.scheduler.deadline();
            let active = run.scheduler.state().is_active();

            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if active => {
                    stop(
                        &mut run,
                        StopReason::Interrupted,
                        grace,
                        &mut grace_deadline,
                        &mut sitemap_rx,
                    );
                }

                _ = sleep_until_opt(grace_deadline), if grace_deadline.is_some() => {
                    tracing::warn!(
                        "Grace period expired, abandoning {} in-flight tasks",
                        tasks.len()
                    );
                    task_token.cancel();
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        self.handle_joined(&mut run, joined);
                    }
                    break;
                }

                _ = sleep_until_opt(deadline), if active && deadline.is_some() => {
                    stop(
                        &mut run,
                        StopReason::Deadline,
                        grace,
                        &mut grace_deadline,
                        &mut sitemap_rx,
                    );
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.handle_joined(&mut run, joined);
                }

                discovered = recv_opt(&mut sitemap_rx), if sitemap_rx.is_some() => {
                    match discovered {
                        Some(discovered) => {
                            self.accept_sitemap_url(&mut run, &ctx.scope, discovered)
                        }
                        None => {
                            tracing::debug!("Sitemap source closed");
                            sitemap_rx = None;
                        }
                    }
                }

                _ = sleep_until_opt(next_dispatch), if next_dispatch.is_some() => {
                    next_dispatch = None;
                }
            }
        }

        let state = run.scheduler.state();
        if let Some(reason) = run.scheduler.stop_reason() {
            tracing::info!("Crawl stopped early: {}", reason);
        }

        run.summary.total_urls = run.scheduler.dispatched();
        run.summary.finish(state, run.started.elapsed());

        tracing::info!(
            "Crawl {}: {} fetched ({} from cache), {} failed, {} skipped, {} redirected in {:.2}s",
            state,
            run.summary.fetched,
            run.summary.from_cache,
            run.summary.failed,
            run.summary.skipped,
            run.summary.redirected,
            run.summary.duration.as_secs_f64()
        );

        Ok(run.summary)
    }

    fn task_context(
        &self,
        seeds: &[CanonicalUrl],
        max_depth: u32,
        cancel: CancellationToken,
    ) -> TaskContext {
        let config = &self.config;

        let gate = PolitenessGate::new(
            Arc::clone(&self.transport),
            GateSettings {
                user_agent: config.user_agent.crawler_name.clone(),
                request_delay: Duration::from_millis(config.politeness.request_delay_ms),
                ignore_robots: config.politeness.ignore_robots,
                robots_timeout: Duration::from_secs(config.crawler.fetch_timeout_secs),
            },
        );

        TaskContext {
            transport: Arc::clone(&self.transport),
            cache: Arc::clone(&self.cache),
            gate: Arc::new(gate),
            retry: RetryPolicy {
                max_retries: config.crawler.max_retries,
                backoff: Duration::from_millis(config.crawler.retry_backoff_ms),
            },
            fetch_timeout: Duration::from_secs(config.crawler.fetch_timeout_secs),
            max_depth,
            scope: ScopeRules {
                seeds: seeds.iter().map(|s| s.as_url().clone()).collect(),
                allow_external: config.scope.allow_external,
                allow_subdomains: config.scope.allow_subdomains,
            },
            cancel,
        }
    }

    fn start_sitemap_discovery(
        &self,
        seeds: &[CanonicalUrl],
    ) -> Option<mpsc::Receiver<DiscoveredUrl>> {
        let sitemap = &self.config.sitemap;
        if !sitemap.enabled {
            return None;
        }

        let root = sitemap_root(seeds.first()?.as_url());
        tracing::info!("Discovering URLs from {}", root);

        Some(discover(
            Arc::clone(&self.transport),
            root,
            DiscoverySettings {
                max_subsitemaps: sitemap.max_subsitemaps,
                timeout: Duration::from_secs(sitemap.timeout_secs),
                fetch_timeout: Duration::from_secs(self.config.crawler.fetch_timeout_secs),
            },
        ))
    }

    fn accept_sitemap_url(
        &self,
        run: &mut CrawlRun,
        scope: &ScopeRules,
        discovered: DiscoveredUrl,
    ) {
        run.summary.sitemap_urls_found += 1;

        if !scope.allows(&discovered.url) {
            tracing::trace!("Sitemap URL out of scope: {}", discovered.url);
            return;
        }

        if run.frontier.offer(discovered.url, 0, Some(&discovered.sitemap)) == Offer::Enqueued {
            run.summary.sitemap_urls_used += 1;
            run.summary.discovered += 1;
        }
    }

    /// Books a finished task: counters, sink, and newly discovered links
    ///
    /// A redirect target is offered at the redirecting page's own depth.
    fn handle_joined(&self, run: &mut CrawlRun, joined: Result<TaskOutcome, JoinError>) {
        run.scheduler.record_completion();

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => {
                run.summary.abandoned += 1;
                return;
            }
            Err(e) => {
                tracing::error!("Fetch task failed: {}", e);
                run.summary.failed += 1;
                return;
            }
        };

        if outcome.abandoned {
            tracing::debug!("Abandoned {}", outcome.result.url);
            run.summary.abandoned += 1;
            return;
        }

        let result = outcome.result;
        run.summary.record(result.status, result.depth);

        if let Err(e) = self.sink.emit(&result) {
            tracing::warn!("Failed to emit result for {}: {}", result.url, e);
            run.summary.sink_errors += 1;
        }

        if run.scheduler.state().is_active() {
            if let Some(target) = outcome.redirect {
                if run.frontier.offer(target, result.depth, Some(&result.url)) == Offer::Enqueued {
                    run.summary.discovered += 1;
                }
            }

            let next_depth = result.depth + 1;
            for url in outcome.discovered {
                if run.frontier.offer(url, next_depth, Some(&result.url)) == Offer::Enqueued {
                    run.summary.discovered += 1;
                }
            }
        }

        run.completed += 1;
        if run.completed % PROGRESS_INTERVAL == 0 {
            let elapsed = run.started.elapsed();
            tracing::info!(
                "Progress: {} pages done, {} in frontier, {} in flight, {:.2} pages/sec",
                run.completed,
                run.frontier.len(),
                run.scheduler.in_flight(),
                run.completed as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
            );
        }
    }
}

/// Stops dispatching and arms the grace period
fn stop(
    run: &mut CrawlRun,
    reason: StopReason,
    grace: Duration,
    grace_deadline: &mut Option<Instant>,
    sitemap_rx: &mut Option<mpsc::Receiver<DiscoveredUrl>>,
) {
    if run.scheduler.state().is_terminal() {
        return;
    }
    tracing::info!(
        "Stopping crawl ({}), {} tasks in flight",
        reason,
        run.scheduler.in_flight()
    );
    run.scheduler.cancel(reason);
    grace_deadline.get_or_insert(Instant::now() + grace);
    // Dropping the receiver ends sitemap discovery
    *sitemap_rx = None;
}

fn parse_seeds(seeds: &[String]) -> Result<Vec<CanonicalUrl>, ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    seeds
        .iter()
        .map(|seed| {
            normalize_url(seed)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))
        })
        .collect()
}

/// Opens the configured cache, falling back to no cache
fn open_cache(config: &CacheConfig, connections: usize) -> ResponseCache {
    match ResponseCache::from_config(config, connections) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!("Response cache unavailable, crawling without it: {}", e);
            ResponseCache::disabled()
        }
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn recv_opt(rx: &mut Option<mpsc::Receiver<DiscoveredUrl>>) -> Option<DiscoveredUrl> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::crawler::{HttpResponse, TransportError};
    use crate::output::{CrawlStatus, MemorySink};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use url::Url;

    /// In-memory site: path -> (status, html)
    struct SiteTransport {
        pages: HashMap<String, (u16, String)>,
    }

    #[async_trait]
    impl Transport for SiteTransport {
        async fn fetch(
            &self,
            url: &Url,
            _timeout: Duration,
        ) -> Result<HttpResponse, TransportError> {
            let (status_code, body) = self
                .pages
                .get(url.path())
                .cloned()
                .unwrap_or((404, String::new()));
            let mut headers = BTreeMap::new();
            headers.insert("content-type".to_string(), "text/html".to_string());
            Ok(HttpResponse {
                final_url: url.to_string(),
                status_code,
                headers,
                body,
            })
        }
    }

    fn site(pages: &[(&str, &str)]) -> Arc<SiteTransport> {
        Arc::new(SiteTransport {
            pages: pages
                .iter()
                .map(|(path, body)| (path.to_string(), (200, body.to_string())))
                .collect(),
        })
    }

    fn config(max_depth: i64) -> Config {
        let mut config = Config::default();
        config.crawler.seeds = vec!["http://site.test/".to_string()];
        config.crawler.max_depth = max_depth;
        config.crawler.concurrency = 4;
        config.politeness.request_delay_ms = 0;
        config.politeness.ignore_robots = true;
        config.cache.enabled = false;
        config
    }

    #[test]
    fn test_parse_seeds() {
        assert!(matches!(parse_seeds(&[]), Err(ConfigError::Validation(_))));
        assert!(matches!(
            parse_seeds(&["mailto:x@y.z".to_string()]),
            Err(ConfigError::InvalidUrl(_))
        ));
        let seeds = parse_seeds(&["HTTP://Site.Test/a/".to_string()]).unwrap();
        assert_eq!(seeds[0].as_str(), "http://site.test/a");
    }

    #[tokio::test]
    async fn test_depth_bound() {
        let transport = site(&[
            ("/", r#"<a href="/a">a</a>"#),
            ("/a", r#"<a href="/b">b</a>"#),
            ("/b", r#"<a href="/c">c</a>"#),
            ("/c", "end"),
        ]);
        let sink = Arc::new(MemorySink::new());
        let coordinator = Coordinator::with_transport(config(1), transport, sink.clone()).unwrap();

        let summary = coordinator.run().await.unwrap();
        assert_eq!(summary.state, CrawlState::Done);
        assert_eq!(summary.fetched, 2);

        let mut urls = sink.urls();
        urls.sort();
        assert_eq!(urls, vec!["http://site.test/", "http://site.test/a"]);
    }

    #[tokio::test]
    async fn test_cycle_fetched_once() {
        let transport = site(&[
            ("/", r#"<a href="/a">a</a><a href="/b">b</a>"#),
            ("/a", r#"<a href="/">home</a><a href="/b">b</a>"#),
            ("/b", r#"<a href="/a">a</a><a href="/">home</a>"#),
        ]);
        let sink = Arc::new(MemorySink::new());
        let coordinator = Coordinator::with_transport(config(5), transport, sink.clone()).unwrap();

        let summary = coordinator.run().await.unwrap();
        assert_eq!(summary.total_urls, 3);
        assert_eq!(summary.discovered, 3);
        assert_eq!(sink.urls().len(), 3);
    }

    #[tokio::test]
    async fn test_cached_second_run_matches_first() {
        let transport = site(&[
            ("/", r#"<a href="/a">a</a>"#),
            ("/a", r#"<a href="/b">b</a>"#),
            ("/b", "end"),
        ]);
        let cache_store = Arc::new(MemoryCacheStore::new());

        let first_sink = Arc::new(MemorySink::new());
        let first = Coordinator::with_transport(config(3), transport.clone(), first_sink.clone())
            .unwrap()
            .with_cache(ResponseCache::new(cache_store.clone(), 3600));
        let first_summary = first.run().await.unwrap();
        assert_eq!(first_summary.from_cache, 0);

        let second_sink = Arc::new(MemorySink::new());
        let second = Coordinator::with_transport(config(3), transport, second_sink.clone())
            .unwrap()
            .with_cache(ResponseCache::new(cache_store, 3600));
        let second_summary = second.run().await.unwrap();

        assert_eq!(second_summary.from_cache, 3);
        assert!(second_sink
            .results()
            .iter()
            .all(|r| r.status == CrawlStatus::Cached));

        let mut a = first_sink.urls();
        let mut b = second_sink.urls();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let transport = site(&[("/", r#"<a href="/a">a</a>"#)]);
        let sink = Arc::new(MemorySink::new());
        let coordinator = Coordinator::with_transport(config(3), transport, sink.clone()).unwrap();
        coordinator.cancellation_token().cancel();

        let summary = coordinator.run().await.unwrap();
        assert_eq!(summary.state, CrawlState::Cancelled);
        assert_eq!(summary.total_urls, 0);
        assert!(sink.urls().is_empty());
    }

    #[tokio::test]
    async fn test_request_budget() {
        let transport = site(&[
            ("/", r#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a>"#),
            ("/a", ""),
            ("/b", ""),
            ("/c", ""),
        ]);
        let mut cfg = config(3);
        cfg.crawler.max_requests = Some(2);
        let sink = Arc::new(MemorySink::new());
        let coordinator = Coordinator::with_transport(cfg, transport, sink.clone()).unwrap();

        let summary = coordinator.run().await.unwrap();
        assert_eq!(summary.state, CrawlState::Cancelled);
        assert_eq!(summary.total_urls, 2);
        assert_eq!(sink.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_seed_is_error() {
        let mut cfg = config(3);
        cfg.crawler.seeds.clear();
        let coordinator =
            Coordinator::with_transport(cfg, site(&[]), Arc::new(MemorySink::new())).unwrap();
        assert!(matches!(
            coordinator.run().await,
            Err(SumiError::Config(ConfigError::Validation(_)))
        ));
    }
}
