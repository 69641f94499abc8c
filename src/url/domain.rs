use url::{Host, Url};

/// Second-level labels that act as public suffixes under a country TLD
const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "net", "org", "gov", "ac", "edu", "ne", "or"];

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawl::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.com/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the `host:port` key used to shard per-host politeness state
///
/// Two origins on the same host but different ports are separate sites.
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    match url.port_or_known_default() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}

/// Approximates the registrable domain of a host
///
/// Takes the last two labels, or three when the second-to-last label is a
/// common second-level suffix under a two-letter country code (`co.uk`,
/// `com.au`, ...). IP addresses have no registrable domain.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_crawl::url::registrable_domain;
///
/// let url = Url::parse("https://docs.rs.example.co.uk/").unwrap();
/// assert_eq!(registrable_domain(&url).as_deref(), Some("example.co.uk"));
/// ```
pub fn registrable_domain(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(domain) => Some(registrable_from_host(&domain.to_lowercase())),
        Host::Ipv4(_) | Host::Ipv6(_) => None,
    }
}

fn registrable_from_host(host: &str) -> String {
    let labels: Vec<&str> = host.trim_end_matches('.').split('.').collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }

    let tld = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let keep = if tld.len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&second) {
        3
    } else {
        2
    };

    labels[labels.len().saturating_sub(keep)..].join(".")
}
