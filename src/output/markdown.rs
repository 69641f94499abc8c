//! Markdown summary generation
//!
//! This module generates a human-readable markdown report of a crawl run.

use crate::output::traits::{CrawlSummary, SinkResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown summary of a run to `output_path`
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(SinkError)` - Failed to write summary
pub fn write_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> SinkResult<()> {
    let markdown = format_markdown_summary(summary);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **State**: {}\n", summary.state));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.2} seconds ({:.2} minutes)\n\n",
        summary.duration.as_secs_f64(),
        summary.duration.as_secs_f64() / 60.0
    ));

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str(&format!("- **URLs Dispatched**: {}\n", summary.total_urls));
    md.push_str(&format!("- **URLs Discovered**: {}\n", summary.discovered));
    md.push_str(&format!("- **Success Rate**: {:.2}%\n", summary.success_rate()));
    md.push_str(&format!(
        "- **Cache Hit Rate**: {:.2}%\n\n",
        summary.cache_hit_rate()
    ));

    // Status breakdown
    md.push_str("## Page Status Breakdown\n\n");
    md.push_str("| Status | Count |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!(
        "| Fetched (network) | {} |\n",
        summary.fetched - summary.from_cache
    ));
    md.push_str(&format!("| Fetched (cache) | {} |\n", summary.from_cache));
    md.push_str(&format!("| Failed | {} |\n", summary.failed));
    md.push_str(&format!("| Denied by robots.txt | {} |\n", summary.skipped));
    md.push_str(&format!("| Redirected | {} |\n", summary.redirected));
    md.push_str(&format!("| Abandoned | {} |\n\n", summary.abandoned));

    // Depth breakdown
    if !summary.depth_breakdown.is_empty() {
        md.push_str("## Depth Breakdown\n\n");
        md.push_str("| Depth | Pages |\n");
        md.push_str("|-------|-------|\n");

        for (depth, count) in &summary.depth_breakdown {
            md.push_str(&format!("| {} | {} |\n", depth, count));
        }
        md.push('\n');
    }

    if summary.sitemap_urls_found > 0 {
        md.push_str("## Sitemap Discovery\n\n");
        md.push_str(&format!("- **URLs Found**: {}\n", summary.sitemap_urls_found));
        md.push_str(&format!("- **URLs Used**: {}\n\n", summary.sitemap_urls_used));
    }

    if summary.sink_errors > 0 {
        md.push_str("## Output Errors\n\n");
        md.push_str(&format!(
            "{} results could not be written by an output sink.\n\n",
            summary.sink_errors
        ));
    }

    md
}
