//! Robots.txt handling module
//!
//! This module fetches and parses robots.txt files. Fetch outcomes map onto
//! [`RobotsStatus`]:
//!
//! | Outcome | Status | Effect |
//! |---------|--------|--------|
//! | 2xx with directives | `Rules` | Rules enforced |
//! | 4xx (404, 410, ...) | `Missing` | Allow all |
//! | 5xx, network error, noise body | `Unavailable` | Allow all (fail open) |

mod parser;

pub use parser::RobotsRules;

use crate::crawler::{fetch_following_redirects, Transport};
use std::time::Duration;
use url::Url;

/// Outcome of fetching robots.txt for one host
#[derive(Debug, Clone, PartialEq)]
pub enum RobotsStatus {
    /// A robots.txt was served and parsed
    Rules(RobotsRules),

    /// The host answered 4xx; there is no robots.txt
    Missing,

    /// Fetch or parse failed; crawling proceeds as if unrestricted
    Unavailable(String),
}

impl RobotsStatus {
    /// Checks if `url` may be fetched by `user_agent`
    pub fn allows(&self, user_agent: &str, url: &str) -> bool {
        match self {
            RobotsStatus::Rules(rules) => rules.allows(user_agent, url),
            RobotsStatus::Missing | RobotsStatus::Unavailable(_) => true,
        }
    }

    /// Crawl-delay for `user_agent`, if one applies
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        match self {
            RobotsStatus::Rules(rules) => rules.crawl_delay(user_agent),
            RobotsStatus::Missing | RobotsStatus::Unavailable(_) => None,
        }
    }
}

/// Returns the robots.txt URL for the origin of `url`
pub fn robots_url(url: &Url) -> Option<Url> {
    let mut robots = url.clone();
    robots.set_path("/robots.txt");
    robots.set_query(None);
    robots.set_fragment(None);
    robots.set_username("").ok()?;
    robots.set_password(None).ok()?;
    Some(robots)
}

/// Fetches robots.txt for the host of `url`
///
/// Never fails: every error degrades to `Missing` or `Unavailable`.
pub async fn fetch_robots(transport: &dyn Transport, url: &Url, timeout: Duration) -> RobotsStatus {
    let Some(target) = robots_url(url) else {
        return RobotsStatus::Unavailable(format!("no robots.txt location for {}", url));
    };

    match fetch_following_redirects(transport, &target, timeout).await {
        Ok(response) if response.is_success() => {
            let rules = RobotsRules::parse(&response.body);
            if rules.is_well_formed() {
                tracing::debug!("Loaded robots.txt from {}", target);
                RobotsStatus::Rules(rules)
            } else {
                tracing::warn!("Ignoring malformed robots.txt at {}", target);
                RobotsStatus::Unavailable("malformed robots.txt".to_string())
            }
        }
        Ok(response) if (400..500).contains(&response.status_code) => {
            tracing::debug!(
                "No robots.txt at {} (HTTP {}), allowing all",
                target,
                response.status_code
            );
            RobotsStatus::Missing
        }
        Ok(response) => {
            tracing::warn!(
                "robots.txt at {} returned HTTP {}, allowing all",
                target,
                response.status_code
            );
            RobotsStatus::Unavailable(format!("HTTP {}", response.status_code))
        }
        Err(e) => {
            tracing::warn!("Failed to fetch robots.txt at {}: {}", target, e);
            RobotsStatus::Unavailable(e.to_string())
        }
    }
}
