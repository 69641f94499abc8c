use crate::crawler::Transport;
use crate::politeness::host::HostSlot;
use crate::robots::{fetch_robots, RobotsStatus};
use crate::url::host_key;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Fetch now; the request has been recorded against the host
    Allow,

    /// Host is cooling down; ask again after this long
    Delay(Duration),

    /// robots.txt forbids the URL; never fetch it
    Deny,
}

/// Final result of waiting at the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clearance {
    Admitted,
    Denied,
    Cancelled,
}

/// Settings for [`PolitenessGate`]
#[derive(Debug, Clone)]
pub struct GateSettings {
    /// robots.txt product token
    pub user_agent: String,

    /// Minimum spacing between two requests to the same host
    pub request_delay: Duration,

    /// Skip robots.txt entirely
    pub ignore_robots: bool,

    /// Timeout for the robots.txt request
    pub robots_timeout: Duration,
}

/// Per-host robots.txt and rate limit enforcement
///
/// The gate is shared by all fetch tasks. Host slots are created lazily and
/// the map lock is only held long enough to look one up, so hosts never
/// contend with each other.
pub struct PolitenessGate {
    transport: Arc<dyn Transport>,
    settings: GateSettings,
    hosts: Mutex<HashMap<String, Arc<HostSlot>>>,
}

impl PolitenessGate {
    pub fn new(transport: Arc<dyn Transport>, settings: GateSettings) -> Self {
        Self {
            transport,
            settings,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    fn slot(&self, url: &Url) -> Arc<HostSlot> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(hosts.entry(host_key(url)).or_default())
    }

    /// Loads robots.txt for the host of `url`, at most once per run
    ///
    /// Concurrent callers for the same host wait on the first fetch.
    async fn robots_for(&self, slot: &HostSlot, url: &Url) -> RobotsStatus {
        let transport = self.transport.as_ref();
        let timeout = self.settings.robots_timeout;
        slot.robots
            .get_or_init(|| async move { fetch_robots(transport, url, timeout).await })
            .await
            .clone()
    }

    /// Whether robots.txt for the host of `url` permits fetching it
    ///
    /// Always true when robots are ignored. Does not count as a request.
    pub async fn robots_allows(&self, url: &Url) -> bool {
        if self.settings.ignore_robots {
            return true;
        }
        let slot = self.slot(url);
        self.robots_for(&slot, url)
            .await
            .allows(&self.settings.user_agent, url.as_str())
    }

    /// Decides whether `url` may be fetched now
    ///
    /// The effective per-host delay is the larger of the configured delay and
    /// the robots.txt Crawl-delay.
    pub async fn admit(&self, url: &Url) -> Admission {
        let slot = self.slot(url);
        let mut min_delay = self.settings.request_delay;

        if !self.settings.ignore_robots {
            let robots = self.robots_for(&slot, url).await;
            if !robots.allows(&self.settings.user_agent, url.as_str()) {
                tracing::debug!("robots.txt disallows {}", url);
                return Admission::Deny;
            }
            if let Some(crawl_delay) = robots.crawl_delay(&self.settings.user_agent) {
                min_delay = min_delay.max(crawl_delay);
            }
        }

        match slot.try_acquire(min_delay, Instant::now()) {
            None => Admission::Allow,
            Some(wait) => Admission::Delay(wait),
        }
    }

    /// Waits until `url` is admitted or denied
    ///
    /// Returns `Cancelled` as soon as `cancel` fires, including mid-wait.
    pub async fn wait_for_admission(&self, url: &Url, cancel: &CancellationToken) -> Clearance {
        loop {
            let admission = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Clearance::Cancelled,
                admission = self.admit(url) => admission,
            };

            match admission {
                Admission::Allow => return Clearance::Admitted,
                Admission::Deny => return Clearance::Denied,
                Admission::Delay(wait) => {
                    tracing::trace!("Delaying {} by {:?}", url, wait);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Clearance::Cancelled,
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
            }
        }
    }

    /// Requests admitted so far for the host of `url`
    pub fn request_count(&self, url: &Url) -> u32 {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts
            .get(&host_key(url))
            .map(|slot| slot.request_count())
            .unwrap_or(0)
    }

    /// Number of hosts seen so far
    pub fn host_count(&self) -> usize {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
