//! Per-URL fetch pipeline
//!
//! Each dispatched frontier entry runs through:
//! 1. the robots.txt check
//! 2. cache lookup
//! 3. politeness admission (suspending on delay)
//! 4. the fetch, retried per the retry policy
//! 5. redirect handling
//! 6. link extraction for HTML content
//! 7. normalization and scope filtering
//!
//! The task never touches the frontier. It hands discovered URLs and redirect
//! targets back to the coordinator in its [`TaskOutcome`].

use crate::cache::ResponseCache;
use crate::crawler::fetcher::{is_html_content_type, RetryPolicy, Transport, MAX_REDIRECTS};
use crate::crawler::frontier::FrontierEntry;
use crate::crawler::parser::parse_page;
use crate::output::{CrawlResult, CrawlStatus};
use crate::politeness::{Clearance, PolitenessGate};
use crate::url::{in_scope_any, normalize, CanonicalUrl};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Scope rules applied to discovered links
#[derive(Debug, Clone)]
pub(crate) struct ScopeRules {
    pub(crate) seeds: Vec<Url>,
    pub(crate) allow_external: bool,
    pub(crate) allow_subdomains: bool,
}

impl ScopeRules {
    pub(crate) fn allows(&self, url: &CanonicalUrl) -> bool {
        in_scope_any(
            url.as_url(),
            &self.seeds,
            self.allow_external,
            self.allow_subdomains,
        )
    }
}

/// Shared, read-only state for all fetch tasks of a run
pub(crate) struct TaskContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cache: Arc<ResponseCache>,
    pub(crate) gate: Arc<PolitenessGate>,
    pub(crate) retry: RetryPolicy,
    pub(crate) fetch_timeout: Duration,
    pub(crate) max_depth: u32,
    pub(crate) scope: ScopeRules,
    pub(crate) cancel: CancellationToken,
}

/// What a fetch task hands back to the coordinator
#[derive(Debug)]
pub(crate) struct TaskOutcome {
    pub(crate) result: CrawlResult,

    /// In-scope links to enqueue at `depth + 1`; empty at `max_depth`
    pub(crate) discovered: Vec<CanonicalUrl>,

    /// In-scope redirect target to enqueue at the same depth
    pub(crate) redirect: Option<CanonicalUrl>,

    /// The task stopped because the run was cancelled
    pub(crate) abandoned: bool,
}

impl TaskOutcome {
    fn finished(result: CrawlResult, discovered: Vec<CanonicalUrl>) -> Self {
        Self {
            result,
            discovered,
            redirect: None,
            abandoned: false,
        }
    }

    fn abandoned(entry: &FrontierEntry, attempts: u32) -> Self {
        let mut result = base_result(entry, CrawlStatus::Failed);
        result.error = Some("cancelled".to_string());
        result.attempts = attempts;
        Self {
            result,
            discovered: Vec::new(),
            redirect: None,
            abandoned: true,
        }
    }

    fn denied(entry: &FrontierEntry, attempts: u32) -> Self {
        let mut result = base_result(entry, CrawlStatus::Denied);
        result.error = Some("disallowed by robots.txt".to_string());
        result.attempts = attempts;
        Self::finished(result, Vec::new())
    }

    fn failed(entry: &FrontierEntry, failure: Failure, attempts: u32) -> Self {
        tracing::warn!("Failed to fetch {}: {}", entry.url, failure.message);
        let mut result = base_result(entry, CrawlStatus::Failed);
        result.status_code = failure.status_code;
        result.error = Some(failure.message);
        result.attempts = attempts;
        Self::finished(result, Vec::new())
    }
}

fn base_result(entry: &FrontierEntry, status: CrawlStatus) -> CrawlResult {
    let mut result = CrawlResult::new(entry.url.as_str(), entry.depth, status);
    result.discovered_from = entry.discovered_from.clone();
    result
}

/// Runs one frontier entry to completion
///
/// robots.txt is consulted before the cache, so a URL disallowed now is
/// denied even when an earlier run cached it. Only fetches wait out the
/// per-host delay.
pub(crate) async fn process_entry(ctx: Arc<TaskContext>, entry: FrontierEntry) -> TaskOutcome {
    let allowed = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return TaskOutcome::abandoned(&entry, 0),
        allowed = ctx.gate.robots_allows(entry.url.as_url()) => allowed,
    };
    if !allowed {
        tracing::debug!("robots.txt disallows {}", entry.url);
        return TaskOutcome::denied(&entry, 0);
    }

    if let Some(record) = ctx.cache.get(&entry.url).await {
        tracing::debug!("Cache hit for {}", entry.url);
        let page = Page {
            final_url: &record.final_url,
            status_code: record.status_code,
            content_type: record.content_type(),
            body: &record.body,
        };
        return complete_page(&ctx, &entry, CrawlStatus::Cached, page, 0);
    }

    // Same-page redirects (`/dir` to `/dir/`) are followed here, hop by hop
    let mut target = entry.url.as_url().clone();
    let mut hops = 0;
    let mut attempts = 0;
    let mut tries = 0;
    loop {
        match ctx.gate.wait_for_admission(&target, &ctx.cancel).await {
            Clearance::Admitted => {}
            Clearance::Denied => return TaskOutcome::denied(&entry, attempts),
            Clearance::Cancelled => return TaskOutcome::abandoned(&entry, attempts),
        }

        attempts += 1;
        tries += 1;
        tracing::debug!("Fetching {} (attempt {})", target, tries);

        let fetched = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return TaskOutcome::abandoned(&entry, attempts),
            fetched = ctx.transport.fetch(&target, ctx.fetch_timeout) => fetched,
        };

        let failure = match fetched {
            Ok(response) if response.is_success() => {
                ctx.cache
                    .put(
                        &entry.url,
                        &response.final_url,
                        response.status_code,
                        &response.headers,
                        &response.body,
                    )
                    .await;
                let page = Page {
                    final_url: &response.final_url,
                    status_code: response.status_code,
                    content_type: response.content_type(),
                    body: &response.body,
                };
                return complete_page(&ctx, &entry, CrawlStatus::Fetched, page, attempts);
            }
            Ok(response) => {
                let redirect = response.redirect_location().map(|location| {
                    resolve_redirect(&ctx, &entry, &target, location, response.status_code)
                });
                match redirect {
                    Some(Redirect::SamePage(next)) if hops < MAX_REDIRECTS => {
                        tracing::debug!("{} redirects to {}", target, next);
                        hops += 1;
                        tries = 0;
                        target = next;
                        continue;
                    }
                    Some(Redirect::SamePage(_)) => Failure {
                        status_code: Some(response.status_code),
                        message: "too many redirects".to_string(),
                        retryable: false,
                    },
                    Some(Redirect::Elsewhere(mut outcome)) => {
                        outcome.result.attempts = attempts;
                        return outcome;
                    }
                    None => Failure {
                        status_code: Some(response.status_code),
                        message: format!("HTTP {}", response.status_code),
                        retryable: RetryPolicy::is_retryable_status(response.status_code),
                    },
                }
            }
            Err(e) => Failure {
                status_code: None,
                message: e.to_string(),
                retryable: true,
            },
        };

        if !failure.retryable || !ctx.retry.allows_retry(tries) {
            return TaskOutcome::failed(&entry, failure, attempts);
        }

        let backoff = ctx.retry.backoff_for(tries);
        tracing::info!(
            "Retrying {} in {:?} after: {}",
            target,
            backoff,
            failure.message
        );
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return TaskOutcome::abandoned(&entry, attempts),
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

enum Redirect {
    /// The target canonicalizes to the entry itself; fetch it next
    SamePage(Url),

    /// The target is another URL; the entry is finished
    Elsewhere(TaskOutcome),
}

/// Classifies a redirect from `from` (a hop of `entry`) to `location`
///
/// Targets that are a different URL are never fetched by this task. In-scope
/// ones go back to the coordinator, so they pass the visited set and robots
/// like any discovered link.
fn resolve_redirect(
    ctx: &TaskContext,
    entry: &FrontierEntry,
    from: &Url,
    location: &str,
    status_code: u16,
) -> Redirect {
    let mut result = base_result(entry, CrawlStatus::Redirected);
    result.status_code = Some(status_code);

    let canonical = match normalize(location, from) {
        Ok(canonical) => canonical,
        Err(rejection) => {
            tracing::debug!(
                "Not following redirect from {} to {:?}: {}",
                from,
                location,
                rejection
            );
            result.error = Some(format!("redirect not followed: {}", rejection));
            return Redirect::Elsewhere(TaskOutcome::finished(result, Vec::new()));
        }
    };

    if canonical == entry.url {
        if let Ok(mut next) = from.join(location) {
            next.set_fragment(None);
            if &next != from {
                return Redirect::SamePage(next);
            }
        }
        result.error = Some("redirect loop".to_string());
        return Redirect::Elsewhere(TaskOutcome::finished(result, Vec::new()));
    }

    result.redirect_to = Some(canonical.as_str().to_string());
    if !ctx.scope.allows(&canonical) {
        tracing::debug!("Not following out-of-scope redirect {} -> {}", entry.url, canonical);
        return Redirect::Elsewhere(TaskOutcome::finished(result, Vec::new()));
    }

    tracing::debug!("{} redirects to {}", entry.url, canonical);
    let mut outcome = TaskOutcome::finished(result, Vec::new());
    outcome.redirect = Some(canonical);
    Redirect::Elsewhere(outcome)
}

struct Failure {
    status_code: Option<u16>,
    message: String,
    retryable: bool,
}

/// A successful response, from the network or the cache
struct Page<'a> {
    final_url: &'a str,
    status_code: u16,
    content_type: Option<&'a str>,
    body: &'a str,
}

fn complete_page(
    ctx: &TaskContext,
    entry: &FrontierEntry,
    status: CrawlStatus,
    page: Page<'_>,
    attempts: u32,
) -> TaskOutcome {
    let mut result = base_result(entry, status);
    result.status_code = Some(page.status_code);
    result.attempts = attempts;
    result.content = Some(page.body.to_string());

    if !is_html_content_type(page.content_type) {
        tracing::debug!(
            "Not extracting links from {} ({})",
            entry.url,
            page.content_type.unwrap_or("unknown type")
        );
        return TaskOutcome::finished(result, Vec::new());
    }

    let page_url = Url::parse(page.final_url).unwrap_or_else(|_| entry.url.as_url().clone());
    let parsed = parse_page(page.body);
    let base = parsed.effective_base(&page_url);

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for raw in &parsed.links {
        match normalize(raw, &base) {
            Ok(link) if ctx.scope.allows(&link) => {
                if seen.insert(link.as_str().to_string()) {
                    links.push(link);
                }
            }
            Ok(link) => tracing::trace!("Out of scope: {}", link),
            Err(rejection) => tracing::trace!("Rejected link {:?}: {}", raw, rejection),
        }
    }

    result.title = parsed.title;
    result.metadata = parsed.metadata;
    result.links = links.iter().map(|l| l.as_str().to_string()).collect();

    let discovered = if entry.depth < ctx.max_depth {
        links
    } else {
        Vec::new()
    };

    TaskOutcome::finished(result, discovered)
}
