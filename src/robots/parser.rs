//! Robots.txt parser implementation
//!
//! Allow/Disallow matching is delegated to the robotstxt crate. Groups,
//! Crawl-delay and Sitemap lines are read here since the matcher does not
//! expose them.

use robotstxt::DefaultMatcher;
use std::time::Duration;

const KNOWN_DIRECTIVES: &[&str] = &["user-agent", "allow", "disallow", "crawl-delay", "sitemap"];

/// One `User-agent` group
#[derive(Debug, Clone, PartialEq)]
struct Group {
    /// Lowercased product tokens
    agents: Vec<String>,
    crawl_delay: Option<Duration>,
}

impl Group {
    fn is_wildcard(&self) -> bool {
        self.agents.iter().any(|a| a == "*")
    }

    fn matches(&self, agent: &str) -> bool {
        self.agents
            .iter()
            .any(|a| a != "*" && !a.is_empty() && agent.starts_with(a.as_str()))
    }
}

/// Parsed robots.txt data
#[derive(Debug, Clone, PartialEq)]
pub struct RobotsRules {
    /// Raw robots.txt content
    content: String,
    groups: Vec<Group>,
    sitemaps: Vec<String>,
    /// Number of lines carrying a recognised directive
    directive_lines: usize,
}

impl RobotsRules {
    /// Parses raw robots.txt content
    ///
    /// Parsing never fails; unknown lines are ignored. Use
    /// [`RobotsRules::is_well_formed`] to tell a real file from noise such as
    /// an HTML error page served with status 200.
    pub fn parse(content: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut sitemaps = Vec::new();
        let mut directive_lines = 0;
        // True while consecutive User-agent lines extend the same group
        let mut collecting_agents = false;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            if !KNOWN_DIRECTIVES.contains(&key.as_str()) {
                continue;
            }
            directive_lines += 1;

            match key.as_str() {
                "user-agent" => {
                    let agent = value.to_ascii_lowercase();
                    match groups.last_mut() {
                        Some(group) if collecting_agents => group.agents.push(agent),
                        _ => groups.push(Group {
                            agents: vec![agent],
                            crawl_delay: None,
                        }),
                    }
                    collecting_agents = true;
                }
                "crawl-delay" => {
                    collecting_agents = false;
                    if let Some(group) = groups.last_mut() {
                        if let Some(delay) = parse_delay(value) {
                            group.crawl_delay.get_or_insert(delay);
                        }
                    }
                }
                "sitemap" => {
                    // Sitemap lines are global and do not close a group
                    if !value.is_empty() {
                        sitemaps.push(value.to_string());
                    }
                }
                _ => collecting_agents = false,
            }
        }

        Self {
            content: content.to_string(),
            groups,
            sitemaps,
            directive_lines,
        }
    }

    /// Returns the raw robots.txt content
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Returns false for non-empty content without a single robots directive
    pub fn is_well_formed(&self) -> bool {
        self.content.trim().is_empty() || self.directive_lines > 0
    }

    /// Checks if `url` (absolute) may be fetched by `user_agent`
    ///
    /// `user_agent` is the product token (e.g. `SumiCrawl`), not the full
    /// User-Agent header.
    pub fn allows(&self, user_agent: &str, url: &str) -> bool {
        if self.groups.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay that applies to `user_agent`
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let agent = user_agent.to_ascii_lowercase();

        let specific = self
            .groups
            .iter()
            .filter(|g| g.matches(&agent))
            .find_map(|g| g.crawl_delay);

        specific.or_else(|| {
            self.groups
                .iter()
                .filter(|g| g.is_wildcard())
                .find_map(|g| g.crawl_delay)
        })
    }

    /// `Sitemap:` URLs listed in the file
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

fn parse_delay(value: &str) -> Option<Duration> {
    let secs = value.parse::<f64>().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
