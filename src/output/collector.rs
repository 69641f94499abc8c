use crate::output::traits::{CrawlResult, ResultSink, SinkResult};
use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

/// Accumulates the union of links found across all pages
#[derive(Debug, Default)]
pub struct LinkCollectorSink {
    links: Mutex<BTreeSet<String>>,
}

impl LinkCollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the links collected so far, sorted
    pub fn links(&self) -> Vec<String> {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultSink for LinkCollectorSink {
    fn emit(&self, result: &CrawlResult) -> SinkResult<()> {
        let mut links = self.links.lock().unwrap_or_else(PoisonError::into_inner);
        links.extend(result.links.iter().cloned());
        Ok(())
    }
}

/// Keeps every emitted result in memory, in emission order
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Mutex<Vec<CrawlResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<CrawlResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// URLs emitted so far, in emission order
    pub fn urls(&self) -> Vec<String> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }
}

impl ResultSink for MemorySink {
    fn emit(&self, result: &CrawlResult) -> SinkResult<()> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
        Ok(())
    }
}
