use crate::output::traits::{CrawlResult, ResultSink, SinkResult};
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Prints a block per crawled page
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    /// A sink writing to stdout
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

/// Formats the block printed for one result
pub fn format_result(result: &CrawlResult) -> String {
    let mut block = String::new();
    block.push_str(&format!("\n--- Page Crawled: {} ---\n", result.url));
    block.push_str(&format!(
        "Title: {}\n",
        result.title.as_deref().unwrap_or("No title")
    ));
    match result.status_code {
        Some(code) => block.push_str(&format!("Status: {} ({})\n", code, result.status.as_str())),
        None => block.push_str(&format!("Status: {}\n", result.status.as_str())),
    }
    block.push_str(&format!("Depth: {}\n", result.depth));
    if let Some(error) = &result.error {
        block.push_str(&format!("Error: {}\n", error));
    }
    if let Some(target) = &result.redirect_to {
        block.push_str(&format!("Redirects to: {}\n", target));
    }
    block.push_str(&format!("Links found: {}\n", result.links.len()));
    block.push_str(&"-".repeat(50));
    block.push('\n');
    block
}

impl ResultSink for ConsoleSink {
    fn emit(&self, result: &CrawlResult) -> SinkResult<()> {
        let block = format_result(result);
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(block.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}
