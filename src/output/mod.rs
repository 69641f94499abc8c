//! Output module for crawl results and run reports
//!
//! This module handles:
//! - The `ResultSink` interface every finished URL is emitted to
//! - Console, JSON file and in-memory sinks
//! - Printing and writing markdown summaries of a run

mod collector;
mod composite;
mod console;
mod json;
mod markdown;
pub mod stats;
mod traits;

pub use collector::{LinkCollectorSink, MemorySink};
pub use composite::{CompositeSink, NullSink};
pub use console::{format_result, ConsoleSink};
pub use json::{safe_filename, JsonFileSink};
pub use markdown::{format_markdown_summary, write_markdown_summary};
pub use stats::{format_summary, print_summary};
pub use traits::{CrawlResult, CrawlStatus, CrawlSummary, ResultSink, SinkError, SinkResult};

use crate::config::OutputConfig;
use std::sync::Arc;

/// Builds the sink selected by the output configuration
///
/// No configured output yields a [`NullSink`]; one output is returned as is;
/// several are wrapped in a [`CompositeSink`].
pub fn build_sink(config: &OutputConfig) -> SinkResult<Arc<dyn ResultSink>> {
    let mut sinks: Vec<Arc<dyn ResultSink>> = Vec::new();

    if config.print_pages {
        sinks.push(Arc::new(ConsoleSink::stdout()));
    }

    if let Some(dir) = &config.json_dir {
        sinks.push(Arc::new(JsonFileSink::new(dir)?));
    }

    Ok(match sinks.len() {
        0 => Arc::new(NullSink),
        1 => sinks.remove(0),
        _ => Arc::new(CompositeSink::new(sinks)),
    })
}
