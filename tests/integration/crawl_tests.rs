//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use std::path::Path;
use std::sync::Arc;
use sumi_crawl::config::Config;
use sumi_crawl::crawler::Coordinator;
use sumi_crawl::output::{CrawlStatus, MemorySink};
use sumi_crawl::CrawlState;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration crawling `seed` with no delays
fn create_test_config(seed: &str, max_depth: i64) -> Config {
    let mut config = Config::default();
    config.crawler.seeds = vec![seed.to_string()];
    config.crawler.max_depth = max_depth;
    config.crawler.concurrency = 4;
    config.crawler.fetch_timeout_secs = 5;
    config.politeness.request_delay_ms = 0;
    config.cache.enabled = false;
    config.user_agent.crawler_name = "TestBot".to_string();
    config
}

fn with_cache_dir(mut config: Config, dir: &Path) -> Config {
    config.cache.enabled = true;
    config.cache.persistent = true;
    config.cache.directory = dir.to_string_lossy().to_string();
    config
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head><title>t</title></head><body>{}</body></html>", body),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, page: &str, body: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(page))
        .respond_with(html(body))
        .expect(times)
        .mount(server)
        .await;
}

async fn run(config: Config) -> (sumi_crawl::CrawlSummary, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let coordinator = Coordinator::new(config, sink.clone()).expect("Failed to create coordinator");
    let summary = coordinator.run().await.expect("Crawl failed");
    (summary, sink)
}

fn sorted_urls(sink: &MemorySink) -> Vec<String> {
    let mut urls = sink.urls();
    urls.sort();
    urls
}

#[tokio::test]
async fn test_linear_chain_stops_at_max_depth() {
    let server = MockServer::start().await;

    mount_page(&server, "/", r#"<a href="/a.html">a</a>"#, 1).await;
    mount_page(&server, "/a.html", r#"<a href="/b.html">b</a>"#, 1).await;
    mount_page(&server, "/b.html", r#"<a href="/c.html">c</a>"#, 1).await;
    mount_page(&server, "/c.html", "end", 0).await;

    let (summary, sink) = run(create_test_config(&server.uri(), 2)).await;

    assert_eq!(summary.state, CrawlState::Done);
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.depth_breakdown.get(&2), Some(&1));

    let b = sink
        .results()
        .into_iter()
        .find(|r| r.url.ends_with("/b.html"))
        .expect("b.html missing");
    assert_eq!(b.depth, 2);
    // The last level still reports its links, they are just not followed
    assert_eq!(b.links.len(), 1);
}

#[tokio::test]
async fn test_robots_disallow_enforced() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(robots("User-agent: *\nDisallow: /private/"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/",
        r#"<a href="/public/p1">p1</a><a href="/private/x">x</a>"#,
        1,
    )
    .await;
    mount_page(&server, "/public/p1", "public", 1).await;
    mount_page(&server, "/private/x", "secret", 0).await;

    let (summary, sink) = run(create_test_config(&server.uri(), 2)).await;

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.skipped, 1);

    let denied: Vec<_> = sink
        .results()
        .into_iter()
        .filter(|r| r.status == CrawlStatus::Denied)
        .collect();
    assert_eq!(denied.len(), 1);
    assert!(denied[0].url.ends_with("/private/x"));
}

#[tokio::test]
async fn test_robots_ignored() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(robots("User-agent: *\nDisallow: /private/"))
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "/", r#"<a href="/private/x">x</a>"#, 1).await;
    mount_page(&server, "/private/x", "secret", 1).await;

    let mut config = create_test_config(&server.uri(), 2);
    config.politeness.ignore_robots = true;
    let (summary, _) = run(config).await;

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn test_cyclic_links_fetched_once() {
    let server = MockServer::start().await;

    mount_page(&server, "/", r#"<a href="/a">a</a><a href="/b">b</a>"#, 1).await;
    mount_page(
        &server,
        "/a",
        r#"<a href="/b">b</a><a href="/">home</a><a href="/a/">self</a>"#,
        1,
    )
    .await;
    mount_page(&server, "/b", r#"<a href="/a#top">a</a><a href="/?">home</a>"#, 1).await;

    let (summary, sink) = run(create_test_config(&server.uri(), 10)).await;

    assert_eq!(summary.state, CrawlState::Done);
    assert_eq!(summary.total_urls, 3);
    assert_eq!(sink.urls().len(), 3);
}

fn sitemap_xml(base: &str, count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
    );
    for i in 0..count {
        xml.push_str(&format!("<url><loc>{}/listed/{}</loc></url>", base, i));
    }
    xml.push_str("</urlset>");
    xml
}

#[tokio::test]
async fn test_sitemap_seeds_frontier() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sitemap_xml(&base, 10), "application/xml"),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/", "no links", 1).await;
    for i in 0..10 {
        mount_page(&server, &format!("/listed/{}", i), "listed", 1).await;
    }

    let mut config = create_test_config(&base, 1);
    config.sitemap.enabled = true;
    let (summary, sink) = run(config).await;

    assert_eq!(summary.sitemap_urls_found, 10);
    assert_eq!(summary.sitemap_urls_used, 10);
    assert_eq!(summary.fetched, 11);
    assert_eq!(sink.urls().len(), 11);
}

#[tokio::test]
async fn test_sitemap_disabled() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sitemap_xml(&base, 10), "application/xml"),
        )
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "/", "no links", 1).await;
    mount_page(&server, "/listed/0", "listed", 0).await;

    let (summary, _) = run(create_test_config(&base, 1)).await;

    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.sitemap_urls_found, 0);
}

#[tokio::test]
async fn test_cache_serves_second_run() {
    let cache_dir = TempDir::new().expect("Failed to create temp dir");
    let server = MockServer::start().await;

    // Each page is fetched over the network exactly once across both runs
    mount_page(&server, "/", r#"<a href="/a">a</a><a href="/b">b</a>"#, 1).await;
    mount_page(&server, "/a", r#"<a href="/b">b</a>"#, 1).await;
    mount_page(&server, "/b", "leaf", 1).await;

    let config = with_cache_dir(create_test_config(&server.uri(), 2), cache_dir.path());
    let (first, first_sink) = run(config.clone()).await;
    assert_eq!(first.fetched, 3);
    assert_eq!(first.from_cache, 0);

    let (second, second_sink) = run(config).await;
    assert_eq!(second.fetched, 3);
    assert_eq!(second.from_cache, 3);
    assert_eq!(sorted_urls(&first_sink), sorted_urls(&second_sink));
}

#[tokio::test]
async fn test_cache_on_and_off_see_same_pages() {
    let cache_dir = TempDir::new().expect("Failed to create temp dir");
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/x">x</a><a href="/y">y</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(html(r#"<a href="/z">z</a>"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/y"))
        .respond_with(html(""))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/z"))
        .respond_with(html(""))
        .mount(&server)
        .await;

    let (_, uncached) = run(create_test_config(&server.uri(), 3)).await;
    let config = with_cache_dir(create_test_config(&server.uri(), 3), cache_dir.path());
    let (_, cold) = run(config.clone()).await;
    let (_, warm) = run(config).await;

    assert_eq!(sorted_urls(&uncached), sorted_urls(&cold));
    assert_eq!(sorted_urls(&cold), sorted_urls(&warm));
    assert_eq!(uncached.urls().len(), 4);
}

#[tokio::test]
async fn test_server_error_counted_as_failed() {
    let server = MockServer::start().await;

    mount_page(&server, "/", r#"<a href="/ok">ok</a><a href="/broken">broken</a>"#, 1).await;
    mount_page(&server, "/ok", "fine", 1).await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let (summary, sink) = run(create_test_config(&server.uri(), 2)).await;

    assert_eq!(summary.state, CrawlState::Done);
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.failed, 1);

    let broken = sink
        .results()
        .into_iter()
        .find(|r| r.url.ends_with("/broken"))
        .expect("broken page missing");
    assert_eq!(broken.status, CrawlStatus::Failed);
    assert_eq!(broken.status_code, Some(500));
}

#[tokio::test]
async fn test_server_error_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server.uri(), 1);
    config.crawler.max_retries = 2;
    config.crawler.retry_backoff_ms = 1;
    let (summary, sink) = run(config).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(sink.results()[0].attempts, 3);
}

#[tokio::test]
async fn test_external_links_not_followed() {
    let server = MockServer::start().await;
    let other = MockServer::start().await;

    let external = other.uri().replace("127.0.0.1", "localhost");
    mount_page(
        &server,
        "/",
        &format!(r#"<a href="{}/elsewhere">external</a>"#, external),
        1,
    )
    .await;
    mount_page(&other, "/elsewhere", "elsewhere", 0).await;

    let (summary, _) = run(create_test_config(&server.uri(), 2)).await;
    assert_eq!(summary.fetched, 1);
}

#[tokio::test]
async fn test_json_sink_writes_pages() {
    let output_dir = TempDir::new().expect("Failed to create temp dir");
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/a">a</a>"#, 1).await;
    mount_page(&server, "/a", "leaf", 1).await;

    let mut config = create_test_config(&server.uri(), 1);
    config.output.json_dir = Some(output_dir.path().to_string_lossy().to_string());
    let sink = sumi_crawl::output::build_sink(&config.output).expect("Failed to build sink");

    let summary = Coordinator::new(config, sink)
        .expect("Failed to create coordinator")
        .run()
        .await
        .expect("Crawl failed");
    assert_eq!(summary.fetched, 2);

    let files = std::fs::read_dir(output_dir.path())
        .expect("Failed to read output dir")
        .count();
    assert_eq!(files, 2);
}

fn redirect_to(location: &str) -> ResponseTemplate {
    ResponseTemplate::new(302).insert_header("Location", location)
}

fn robots(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body)
}

#[tokio::test]
async fn test_redirect_targets_obey_robots_and_visited_set() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(robots("User-agent: *\nDisallow: /private/"))
        .mount(&server)
        .await;
    mount_page(
        &server,
        "/",
        r#"<a href="/go">go</a><a href="/b">b</a><a href="/hop">hop</a>"#,
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/go"))
        .respond_with(redirect_to("/private/x"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hop"))
        .respond_with(redirect_to("/b"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/private/x", "secret", 0).await;
    mount_page(&server, "/b", "leaf", 1).await;

    let (summary, sink) = run(create_test_config(&server.uri(), 1)).await;

    assert_eq!(summary.state, CrawlState::Done);
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.redirected, 2);
    assert_eq!(summary.skipped, 1);

    let results = sink.results();
    let go = results
        .iter()
        .find(|r| r.url.ends_with("/go"))
        .expect("/go missing");
    assert_eq!(go.status, CrawlStatus::Redirected);
    assert!(go.redirect_to.as_deref().unwrap().ends_with("/private/x"));

    let private = results
        .iter()
        .find(|r| r.url.ends_with("/private/x"))
        .expect("/private/x missing");
    assert_eq!(private.status, CrawlStatus::Denied);
    assert_eq!(private.depth, 1);
    assert!(private.discovered_from.as_deref().unwrap().ends_with("/go"));
}

#[tokio::test]
async fn test_cached_page_keeps_redirected_link_base() {
    let cache_dir = TempDir::new().expect("Failed to create temp dir");
    let server = MockServer::start().await;

    mount_page(&server, "/", r#"<a href="/dir">dir</a>"#, 1).await;
    Mock::given(method("GET"))
        .and(path("/dir"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/dir/"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/dir/", r#"<a href="page">page</a>"#, 1).await;
    mount_page(&server, "/dir/page", "leaf", 1).await;

    let config = with_cache_dir(create_test_config(&server.uri(), 2), cache_dir.path());
    let (cold, cold_sink) = run(config.clone()).await;
    let (warm, warm_sink) = run(config).await;

    let urls = sorted_urls(&cold_sink);
    assert_eq!(urls.len(), 3);
    assert!(urls.iter().any(|u| u.ends_with("/dir/page")));
    assert!(!urls.iter().any(|u| u.ends_with("/page") && !u.ends_with("/dir/page")));
    assert_eq!(urls, sorted_urls(&warm_sink));

    assert_eq!(cold.from_cache, 0);
    assert_eq!(warm.from_cache, 3);
}

#[tokio::test]
async fn test_robots_applies_to_cached_pages() {
    let cache_dir = TempDir::new().expect("Failed to create temp dir");
    let server = MockServer::start().await;

    // Only the second run asks for robots.txt
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(robots("User-agent: *\nDisallow: /private/"))
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/", r#"<a href="/private/x">x</a>"#, 1).await;
    mount_page(&server, "/private/x", "secret", 1).await;

    let mut permissive = with_cache_dir(create_test_config(&server.uri(), 1), cache_dir.path());
    permissive.politeness.ignore_robots = true;
    let (first, _) = run(permissive).await;
    assert_eq!(first.fetched, 2);

    let strict = with_cache_dir(create_test_config(&server.uri(), 1), cache_dir.path());
    let (second, sink) = run(strict).await;

    assert_eq!(second.from_cache, 1);
    assert_eq!(second.skipped, 1);
    let private = sink
        .results()
        .into_iter()
        .find(|r| r.url.ends_with("/private/x"))
        .expect("/private/x missing");
    assert_eq!(private.status, CrawlStatus::Denied);
    assert!(private.content.is_none());
}
