use crate::output::traits::{CrawlResult, ResultSink, SinkError, SinkResult};
use std::sync::Arc;

/// Fans each result out to several sinks
///
/// Every child sees every result, even after an earlier child failed. The
/// first error is returned.
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<Arc<dyn ResultSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn ResultSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ResultSink for CompositeSink {
    fn emit(&self, result: &CrawlResult) -> SinkResult<()> {
        let mut first_error: Option<SinkError> = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(result) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Discards every result
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ResultSink for NullSink {
    fn emit(&self, _result: &CrawlResult) -> SinkResult<()> {
        Ok(())
    }
}
