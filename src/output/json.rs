use crate::output::traits::{CrawlResult, ResultSink, SinkResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Longest file stem produced from a URL
const MAX_STEM_LEN: usize = 100;

/// Writes one pretty-printed JSON file per result
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    /// Creates the sink, creating `dir` if needed
    pub fn new(dir: impl AsRef<Path>) -> SinkResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file written for `url`
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(safe_filename(url))
    }
}

/// Derives a file name from a URL
///
/// `://`, `/` and `.` become `_`, the stem is cut to 100 characters and
/// `.json` is appended.
///
/// # Examples
///
/// ```
/// use sumi_crawl::output::safe_filename;
///
/// assert_eq!(safe_filename("https://example.com/a/b.html"), "https_example_com_a_b_html.json");
/// ```
pub fn safe_filename(url: &str) -> String {
    let stem: String = url
        .replace("://", "_")
        .chars()
        .map(|c| match c {
            '/' | '.' => '_',
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '=' | '&' | '%') => c,
            _ => '_',
        })
        .take(MAX_STEM_LEN)
        .collect();
    format!("{}.json", stem)
}

impl ResultSink for JsonFileSink {
    fn emit(&self, result: &CrawlResult) -> SinkResult<()> {
        let json = serde_json::to_string_pretty(result)?;
        fs::write(self.path_for(&result.url), json)?;
        Ok(())
    }
}
