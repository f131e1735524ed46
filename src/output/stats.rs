//! Crawl statistics rendering
//!
//! Turns the store's counters into the `--stats` and `--errors` reports.

use crate::storage::{CrawlStatistics, WorkItem};
use crate::ItemStatus;
use std::fmt::Write;

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Formats statistics as a plain-text report
pub fn render_statistics(stats: &CrawlStatistics) -> String {
    let total = stats.total_items();
    let mut out = String::new();

    let _ = writeln!(out, "=== Harvest Statistics ===\n");
    let _ = writeln!(out, "Work items: {}", total);
    for (status, count) in [
        (ItemStatus::Pending, stats.pending),
        (ItemStatus::InProgress, stats.in_progress),
        (ItemStatus::Completed, stats.completed),
        (ItemStatus::Error, stats.error),
    ] {
        let _ = writeln!(
            out,
            "  {:<12} {:>7} ({:.1}%)",
            status.to_string(),
            count,
            percentage(count, total)
        );
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Catalog:");
    let _ = writeln!(out, "  shows        {:>7}", stats.shows);
    let _ = writeln!(out, "  seasons      {:>7}", stats.seasons);
    let _ = writeln!(out, "  episodes     {:>7}", stats.episodes);
    let _ = writeln!(out, "  servers      {:>7}", stats.servers);

    out
}

/// Formats failed items with their last recorded cause
pub fn render_errors(items: &[WorkItem]) -> String {
    if items.is_empty() {
        return "No items in error.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Items in error ({}):", items.len());
    for item in items {
        let _ = writeln!(
            out,
            "  [{}] {} (attempts: {})",
            item.kind, item.url, item.attempt_count
        );
        if let Some(reason) = &item.last_error {
            let _ = writeln!(out, "      {}", reason);
        }
    }
    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &CrawlStatistics) {
    print!("{}", render_statistics(stats));
}

/// Prints failed items to stdout
pub fn print_errors(items: &[WorkItem]) {
    print!("{}", render_errors(items));
}
