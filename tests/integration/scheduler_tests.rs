//! Scheduling tests against an instrumented in-memory transport
//!
//! The transport records every request and the peak number of requests in
//! flight, so concurrency limits, deduplication and cancellation can be
//! checked without a network.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sumi_crawl::config::Config;
use sumi_crawl::crawler::{Coordinator, HttpResponse, Transport, TransportError};
use sumi_crawl::output::{CrawlStatus, MemorySink};
use sumi_crawl::{CrawlState, CrawlSummary};
use url::Url;

const BASE: &str = "http://graph.test";

/// Link graph served with a fixed latency per request
struct GraphTransport {
    links: HashMap<String, Vec<String>>,
    latency: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

/// Decrements the active counter even when the request is dropped mid-flight
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GraphTransport {
    fn new(edges: &[(&str, &[&str])], latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            links: edges
                .iter()
                .map(|(page, links)| {
                    (
                        page.to_string(),
                        links.iter().map(|l| l.to_string()).collect(),
                    )
                })
                .collect(),
            latency,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_to(&self, page: &str) -> usize {
        self.calls().iter().filter(|p| *p == page).count()
    }
}

#[async_trait]
impl Transport for GraphTransport {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<HttpResponse, TransportError> {
        let page = url.path().to_string();
        self.calls.lock().unwrap().push(page.clone());

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        let body: String = self
            .links
            .get(&page)
            .into_iter()
            .flatten()
            .map(|link| format!(r#"<a href="{}">{}</a>"#, link, link))
            .collect();

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        Ok(HttpResponse {
            final_url: url.to_string(),
            status_code: 200,
            headers,
            body: format!("<html><body>{}</body></html>", body),
        })
    }
}

fn test_config(max_depth: i64, concurrency: u32) -> Config {
    let mut config = Config::default();
    config.crawler.seeds = vec![format!("{}/", BASE)];
    config.crawler.max_depth = max_depth;
    config.crawler.concurrency = concurrency;
    config.politeness.request_delay_ms = 0;
    config.politeness.ignore_robots = true;
    config.cache.enabled = false;
    config
}

fn coordinator(config: Config, transport: &Arc<GraphTransport>) -> (Coordinator, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let coordinator = Coordinator::with_transport(config, transport.clone(), sink.clone())
        .expect("Failed to create coordinator");
    (coordinator, sink)
}

async fn crawl(config: Config, transport: &Arc<GraphTransport>) -> (CrawlSummary, Arc<MemorySink>) {
    let (coordinator, sink) = coordinator(config, transport);
    let summary = coordinator.run().await.expect("Crawl failed");
    (summary, sink)
}

fn page_names(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("/{}{}", prefix, i)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_limit() {
    let pages = page_names("p", 30);
    let refs: Vec<&str> = pages.iter().map(String::as_str).collect();
    let transport = GraphTransport::new(&[("/", refs.as_slice())], Duration::from_millis(50));

    let (summary, _) = crawl(test_config(1, 3), &transport).await;

    assert_eq!(summary.state, CrawlState::Done);
    assert_eq!(summary.fetched, 31);
    assert_eq!(transport.peak(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_shared_links_fetched_exactly_once() {
    // Every hub links to the same ten leaves, and to every other hub
    let hubs = page_names("hub", 8);
    let leaves = page_names("leaf", 10);
    let mut hub_links: Vec<&str> = leaves.iter().map(String::as_str).collect();
    hub_links.extend(hubs.iter().map(String::as_str));
    hub_links.push("/");

    let hub_refs: Vec<&str> = hubs.iter().map(String::as_str).collect();
    let mut edges: Vec<(&str, &[&str])> = vec![("/", hub_refs.as_slice())];
    for hub in &hubs {
        edges.push((hub.as_str(), hub_links.as_slice()));
    }
    let transport = GraphTransport::new(&edges, Duration::from_millis(5));

    let (summary, sink) = crawl(test_config(3, 8), &transport).await;

    assert_eq!(summary.total_urls, 19);
    assert_eq!(transport.calls().len(), 19);
    for page in hubs.iter().chain(leaves.iter()) {
        assert_eq!(transport.calls_to(page), 1, "{} fetched more than once", page);
    }
    assert_eq!(transport.calls_to("/"), 1);
    assert_eq!(sink.urls().len(), 19);
}

#[tokio::test(start_paused = true)]
async fn test_breadth_first_depths() {
    // "/x" is reachable at depth 1 directly and at depth 3 through a chain
    let transport = GraphTransport::new(
        &[
            ("/", &["/chain1", "/x"][..]),
            ("/chain1", &["/chain2"][..]),
            ("/chain2", &["/x", "/deep"][..]),
            ("/x", &["/y"][..]),
        ],
        Duration::from_millis(10),
    );

    let (summary, sink) = crawl(test_config(5, 1), &transport).await;
    assert_eq!(summary.state, CrawlState::Done);

    let results = sink.results();
    let depth_of = |page: &str| {
        results
            .iter()
            .find(|r| r.url == format!("{}{}", BASE, page))
            .map(|r| r.depth)
    };
    assert_eq!(depth_of("/"), Some(0));
    assert_eq!(depth_of("/x"), Some(1));
    assert_eq!(depth_of("/y"), Some(2));
    assert_eq!(depth_of("/deep"), Some(3));

    // With one worker, results arrive in dispatch order
    let depths: Vec<u32> = results.iter().map(|r| r.depth).collect();
    let mut sorted = depths.clone();
    sorted.sort();
    assert_eq!(depths, sorted);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_abandons_in_flight_work() {
    let pages = page_names("slow", 10);
    let refs: Vec<&str> = pages.iter().map(String::as_str).collect();
    let transport = GraphTransport::new(&[("/", refs.as_slice())], Duration::from_secs(60));

    let mut config = test_config(1, 2);
    config.crawler.grace_period_secs = 1;
    let (coordinator, sink) = coordinator(config, &transport);

    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        token.cancel();
    });

    let summary = coordinator.run().await.expect("Crawl failed");

    assert_eq!(summary.state, CrawlState::Cancelled);
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.abandoned, 1);
    assert!(sink.urls().is_empty());
    assert_eq!(transport.calls(), vec!["/".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_request_budget_lets_in_flight_finish() {
    let pages = page_names("p", 10);
    let refs: Vec<&str> = pages.iter().map(String::as_str).collect();
    let transport = GraphTransport::new(&[("/", refs.as_slice())], Duration::from_millis(100));

    let mut config = test_config(1, 2);
    config.crawler.max_requests = Some(3);
    let (summary, sink) = crawl(config, &transport).await;

    assert_eq!(summary.state, CrawlState::Cancelled);
    assert_eq!(summary.total_urls, 3);
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.abandoned, 0);
    assert_eq!(transport.calls().len(), 3);
    assert!(sink.results().iter().all(|r| r.status == CrawlStatus::Fetched));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_with_no_grace_aborts() {
    let pages = page_names("p", 10);
    let refs: Vec<&str> = pages.iter().map(String::as_str).collect();
    let transport = GraphTransport::new(&[("/", refs.as_slice())], Duration::from_secs(2));

    let mut config = test_config(1, 4);
    config.crawler.max_duration_secs = Some(3);
    config.crawler.grace_period_secs = 0;
    let (summary, _) = crawl(config, &transport).await;

    // The seed finishes at t=2s, four pages are in flight when time runs out
    assert_eq!(summary.state, CrawlState::Cancelled);
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.abandoned, 4);
    assert_eq!(summary.total_urls, 5);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_delay_spaces_requests() {
    let pages = page_names("p", 4);
    let refs: Vec<&str> = pages.iter().map(String::as_str).collect();
    let transport = GraphTransport::new(&[("/", refs.as_slice())], Duration::from_millis(1));

    let mut config = test_config(1, 10);
    config.crawler.dispatch_delay_ms = 1_000;

    let start = tokio::time::Instant::now();
    let (summary, _) = crawl(config, &transport).await;

    assert_eq!(summary.fetched, 5);
    // Five dispatches need four gaps
    assert!(start.elapsed() >= Duration::from_secs(4));
    assert_eq!(transport.peak(), 1);
}
