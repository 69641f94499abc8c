//! Run statistics display
//!
//! Prints the end-of-run summary to stdout, the way the CLI reports a crawl.

use crate::output::traits::CrawlSummary;

/// Prints a crawl summary to stdout in a formatted manner
pub fn print_summary(summary: &CrawlSummary) {
    print!("{}", format_summary(summary));
}

/// Formats the text printed by [`print_summary`]
pub fn format_summary(summary: &CrawlSummary) -> String {
    let mut out = String::new();
    out.push_str("=== Crawl Summary ===\n\n");

    out.push_str(&format!("State: {}\n", summary.state));
    out.push_str(&format!(
        "Started: {}\n",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "Duration: {:.2}s\n\n",
        summary.duration.as_secs_f64()
    ));

    out.push_str("Pages:\n");
    out.push_str(&format!("  Dispatched: {}\n", summary.total_urls));
    out.push_str(&format!(
        "  Fetched: {} ({} from cache, {:.1}% hit rate)\n",
        summary.fetched,
        summary.from_cache,
        summary.cache_hit_rate()
    ));
    out.push_str(&format!("  Failed: {}\n", summary.failed));
    out.push_str(&format!("  Skipped (robots.txt): {}\n", summary.skipped));
    if summary.redirected > 0 {
        out.push_str(&format!("  Redirected: {}\n", summary.redirected));
    }
    if summary.abandoned > 0 {
        out.push_str(&format!("  Abandoned: {}\n", summary.abandoned));
    }
    out.push('\n');

    if summary.sitemap_urls_found > 0 {
        out.push_str(&format!(
            "Sitemap: {} URLs found, {} used\n\n",
            summary.sitemap_urls_found, summary.sitemap_urls_used
        ));
    }

    if !summary.depth_breakdown.is_empty() {
        out.push_str("Pages by Depth:\n");
        for (depth, count) in &summary.depth_breakdown {
            out.push_str(&format!("  {}: {}\n", depth, count));
        }
        out.push('\n');
    }

    if summary.sink_errors > 0 {
        out.push_str(&format!("Output errors: {}\n\n", summary.sink_errors));
    }

    out.push_str(&format!(
        "Success Rate: {:.1}% ({} / {} pages)\n",
        summary.success_rate(),
        summary.fetched,
        summary.completed()
    ));
    out
}
