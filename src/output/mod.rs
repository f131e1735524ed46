//! Output module for run summaries and catalog reports
//!
//! This module handles:
//! - Rendering the end-of-run summary
//! - Rendering stored shows and search results for the query modes
//! - Recording crawl statistics (see [`stats`])
//!
//! Every report has a `render_*` function returning the text and a `print_*`
//! wrapper writing it to stdout.

pub mod stats;

pub use stats::{print_errors, print_statistics, render_errors, render_statistics};

use crate::crawler::RunSummary;
use crate::storage::{ShowSummary, StoredShow};
use std::fmt::Write;

/// Formats the counters of a finished run
pub fn render_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Harvest Run ===");
    let _ = writeln!(out, "  claimed:     {}", summary.claimed);
    let _ = writeln!(out, "  completed:   {}", summary.completed);
    let _ = writeln!(out, "  failed:      {}", summary.failed);
    if summary.deferred > 0 {
        let _ = writeln!(out, "  deferred:    {} (left in progress, retried next run)", summary.deferred);
    }
    if summary.lost_claims > 0 {
        let _ = writeln!(out, "  lost claims: {}", summary.lost_claims);
    }
    if summary.interrupted {
        let _ = writeln!(out, "Run interrupted; remaining items resume on the next start.");
    }
    out
}

/// Formats one stored show with its seasons, episodes and servers
pub fn render_show(show: &StoredShow) -> String {
    let subtree = &show.subtree;
    let mut out = String::new();

    let _ = writeln!(out, "#{} {} [{}]", show.id, subtree.title, subtree.kind);
    let _ = writeln!(out, "  source:   {}", subtree.source_url);
    let _ = writeln!(out, "  scraped:  {}", show.scraped_at);
    if let Some(rating) = &subtree.rating {
        let _ = writeln!(out, "  rating:   {}", rating);
    }
    if let Some(poster) = &subtree.poster_url {
        let _ = writeln!(out, "  poster:   {}", poster);
    }
    if let Some(trailer) = &subtree.trailer_url {
        let _ = writeln!(out, "  trailer:  {}", trailer);
    }
    for (key, values) in &subtree.metadata {
        let _ = writeln!(out, "  {}: {}", key, values.join(", "));
    }
    if let Some(synopsis) = &subtree.synopsis {
        let _ = writeln!(out, "\n  {}", synopsis);
    }

    for season in &subtree.seasons {
        let _ = writeln!(
            out,
            "\n  Season {} ({} episodes)",
            season.season_number,
            season.episodes.len()
        );
        for episode in &season.episodes {
            let _ = writeln!(
                out,
                "    Episode {}: {} servers",
                episode.episode_number,
                episode.servers.len()
            );
            for server in &episode.servers {
                let _ = writeln!(out, "      [{}] {}", server.server_number, server.embed_url);
            }
        }
    }

    out
}

/// Formats title search matches, one line each
pub fn render_search_results(term: &str, results: &[ShowSummary]) -> String {
    if results.is_empty() {
        return format!("No shows match '{}'.\n", term);
    }

    let mut out = String::new();
    let _ = writeln!(out, "{} show(s) match '{}':", results.len(), term);
    for show in results {
        let _ = writeln!(
            out,
            "  #{:<6} {} [{}] seasons: {}, episodes: {}{}",
            show.id,
            show.title,
            show.kind,
            show.season_count,
            show.episode_count,
            show.rating
                .as_deref()
                .map(|r| format!(", rating: {}", r))
                .unwrap_or_default()
        );
    }
    out
}

pub fn print_run_summary(summary: &RunSummary) {
    print!("{}", render_run_summary(summary));
}

pub fn print_show(show: &StoredShow) {
    print!("{}", render_show(show));
}

pub fn print_search_results(term: &str, results: &[ShowSummary]) {
    print!("{}", render_search_results(term, results));
}
