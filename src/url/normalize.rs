use crate::UrlError;
use std::fmt;
use url::Url;

/// Query parameters dropped during normalization
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid"];

/// File extensions that never lead to an HTML page
const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "svg", "ico", "tif", "tiff", "avif",
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar",
    // media
    "mp3", "mp4", "m4a", "m4v", "avi", "mov", "mkv", "webm", "wav", "ogg", "flac",
    // documents and binaries
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "exe", "dmg", "iso", "apk",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // page assets
    "css", "js",
];

/// A URL in canonical form
///
/// Canonical URLs are the identity key for deduplication and cache lookup:
/// two URLs refer to the same resource iff their canonical strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    /// Returns the canonical string form
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the underlying parsed URL
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Consumes the canonical URL, returning the parsed URL
    pub fn into_url(self) -> Url {
        self.0
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// Reason a discovered reference was filtered out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Empty or whitespace-only reference
    Empty,
    /// A `#fragment` pointing back into the same page
    FragmentOnly,
    /// Anything other than http or https (mailto:, javascript:, ftp:, ...)
    UnsupportedScheme(String),
    /// Extension marks a non-HTML resource
    BinaryResource(String),
    /// The reference could not be resolved into a URL
    Unparseable(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty reference"),
            Self::FragmentOnly => write!(f, "fragment-only reference"),
            Self::UnsupportedScheme(scheme) => write!(f, "unsupported scheme '{}'", scheme),
            Self::BinaryResource(ext) => write!(f, "binary resource (.{})", ext),
            Self::Unparseable(reason) => write!(f, "unparseable: {}", reason),
        }
    }
}

/// Resolves a raw reference against `base` and canonicalizes it
///
/// # Normalization Steps
///
/// 1. Resolve the reference against the base URL
/// 2. Keep only http and https
/// 3. Lowercase the host and drop the default port (done by the `url` parser)
/// 4. Normalize the path:
///    - Decode percent-encoded unreserved characters, uppercase the rest
///    - Remove dot segments and duplicate slashes
///    - Remove trailing slash (except for root /)
/// 5. Remove fragment
/// 6. Remove tracking query parameters and sort the remaining ones
///
/// References are rejected rather than errored: the crawler drops them and
/// moves on.
///
/// # Examples
///
/// ```
/// use sumi_crawl::url::normalize;
/// use url::Url;
///
/// let base = Url::parse("http://Example.com/docs/").unwrap();
/// let url = normalize("../About/?utm_source=x#team", &base).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/About");
/// ```
pub fn normalize(raw: &str, base: &Url) -> Result<CanonicalUrl, Rejection> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(Rejection::Empty);
    }

    if raw.starts_with('#') {
        return Err(Rejection::FragmentOnly);
    }

    let resolved = base
        .join(raw)
        .map_err(|e| Rejection::Unparseable(e.to_string()))?;

    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return Err(Rejection::UnsupportedScheme(resolved.scheme().to_string()));
    }

    if let Some(ext) = binary_extension(&resolved) {
        return Err(Rejection::BinaryResource(ext));
    }

    canonicalize(resolved).map_err(|e| Rejection::Unparseable(e.to_string()))
}

/// Parses and canonicalizes an absolute URL, such as a seed
///
/// Unlike [`normalize`], failures here are errors: a seed that cannot be
/// crawled is a configuration mistake.
///
/// # Examples
///
/// ```
/// use sumi_crawl::url::normalize_url;
///
/// let url = normalize_url("HTTP://EXAMPLE.COM:80/a/./b/").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/b");
/// ```
pub fn normalize_url(url_str: &str) -> Result<CanonicalUrl, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize(url)
}

/// Applies the canonical form to an already parsed URL
pub fn canonicalize(mut url: Url) -> Result<CanonicalUrl, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    let path = normalize_path(&normalize_percent_encoding(url.path()));
    url.set_path(&path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(CanonicalUrl(url))
}

/// Returns the lowercased extension if the last path segment is a known binary type
///
/// Sitemap and robots resources are never treated as binary, so that
/// `sitemap.xml.gz` style references still reach the discovery code.
fn binary_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?.to_ascii_lowercase();

    if segment.contains("sitemap") || segment == "robots.txt" {
        return None;
    }

    let (_, ext) = segment.rsplit_once('.')?;
    BINARY_EXTENSIONS
        .contains(&ext)
        .then(|| ext.to_string())
}

/// Removes dot segments, duplicate slashes and the trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Decodes `%XX` escapes of unreserved characters and uppercases the others
fn normalize_percent_encoding(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(path.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = &path[i + 1..i + 3];
            if let Ok(value) = u8::from_str_radix(hex, 16) {
                if is_unreserved(value) {
                    out.push(value as char);
                } else {
                    out.push('%');
                    out.push_str(&hex.to_ascii_uppercase());
                }
                i += 3;
                continue;
            }
        }

        // Bytes are copied through unchanged, including multi-byte sequences
        let ch_len = utf8_len(bytes[i]);
        out.push_str(&path[i..i + ch_len]);
        i += ch_len;
    }

    out
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort();
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
