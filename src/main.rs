//! Reel-Harvest main entry point
//!
//! This is the command-line interface for the Reel-Harvest catalog crawler.

use anyhow::{Context, Result};
use clap::Parser;
use reel_harvest::config::{load_config_with_hash, Config};
use reel_harvest::crawler::Harvester;
use reel_harvest::output::{
    print_errors, print_run_summary, print_search_results, print_show, print_statistics,
};
use reel_harvest::storage::{open_storage, CatalogQuery, CrawlStore, SqliteStorage};
use reel_harvest::ItemStatus;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Number of rows `--search` prints
const SEARCH_LIMIT: usize = 50;

/// Reel-Harvest: a resumable catalog crawler
///
/// Reel-Harvest crawls the movie and series pages listed in its seed files,
/// follows seasons and paginated episode listings down to the embed servers,
/// and stores every show atomically in SQLite. Interrupted runs resume where
/// they stopped.
#[derive(Parser, Debug)]
#[command(name = "reel-harvest")]
#[command(version)]
#[command(about = "A resumable catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, group = "mode")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, group = "mode")]
    stats: bool,

    /// List items in error with their last cause and exit
    #[arg(long, group = "mode")]
    errors: bool,

    /// Return the given URLs to pending, deleting their stored shows
    #[arg(long, value_name = "URL", num_args = 1.., group = "mode")]
    reset: Vec<String>,

    /// Return every item in error to pending
    #[arg(long, group = "mode")]
    reset_errors: bool,

    /// Print one stored show with its full subtree
    #[arg(long, value_name = "ID", group = "mode")]
    show: Option<i64>,

    /// Search stored shows by title
    #[arg(long, value_name = "TERM", group = "mode")]
    search: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("reel_harvest=info,warn"),
            1 => EnvFilter::new("reel_harvest=debug,info"),
            2 => EnvFilter::new("reel_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::debug!(hash = %config_hash, "Configuration loaded");

    if cli.dry_run {
        return handle_dry_run(&config);
    }
    if cli.stats {
        let storage = open_store(&config)?;
        print_statistics(&storage.statistics()?);
        return Ok(ExitCode::SUCCESS);
    }
    if cli.errors {
        let storage = open_store(&config)?;
        print_errors(&storage.items_by_status(ItemStatus::Error)?);
        return Ok(ExitCode::SUCCESS);
    }
    if !cli.reset.is_empty() {
        let mut storage = open_store(&config)?;
        let count = storage.reset(&cli.reset)?;
        println!("Reset {} of {} item(s) to pending", count, cli.reset.len());
        return Ok(ExitCode::SUCCESS);
    }
    if cli.reset_errors {
        let mut storage = open_store(&config)?;
        let count = storage.reset_errors()?;
        println!("Reset {} item(s) in error to pending", count);
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(id) = cli.show {
        let storage = open_store(&config)?;
        return Ok(match storage.get_show(id)? {
            Some(show) => {
                print_show(&show);
                ExitCode::SUCCESS
            }
            None => {
                println!("No show with id {}", id);
                ExitCode::FAILURE
            }
        });
    }
    if let Some(term) = &cli.search {
        let storage = open_store(&config)?;
        print_search_results(term, &storage.search_shows(term, SEARCH_LIMIT)?);
        return Ok(ExitCode::SUCCESS);
    }

    handle_harvest(config, config_hash).await
}

fn open_store(config: &Config) -> Result<SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    open_storage(path).with_context(|| format!("failed to open database {}", path.display()))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> Result<ExitCode> {
    let seeds = config.seeds.collect()?;
    let movies = seeds
        .iter()
        .filter(|s| s.kind == reel_harvest::MediaKind::Movie)
        .count();

    println!("=== Reel-Harvest Dry Run ===\n");
    println!("Crawler:");
    println!("  Workers: {}", config.crawler.workers);
    println!("  Episode workers: {}", config.crawler.episode_workers);
    println!("  Server workers: {}", config.crawler.server_workers);
    println!("  Max listing pages: {}", config.crawler.max_listing_pages);

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    println!("  Verify TLS: {}", config.http.verify_tls);
    println!("  Timeout: {}s", config.http.timeout_secs);
    println!("  Request delay: {}ms", config.http.request_delay_ms);
    println!("  Static headers: {}", config.http.headers.len());

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms x{} up to {}ms",
        config.retry.base_delay_ms, config.retry.backoff_multiplier, config.retry.max_delay_ms
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would harvest {} seed URLs ({} movies, {} series)",
        seeds.len(),
        movies,
        seeds.len() - movies
    );

    Ok(ExitCode::SUCCESS)
}

/// Handles the main harvest: runs until drained or a signal arrives
async fn handle_harvest(config: Config, config_hash: String) -> Result<ExitCode> {
    let harvester = Harvester::new(config, config_hash).context("failed to start harvest")?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::warn!("Shutdown requested, finishing in-flight items");
        signal_token.cancel();
    });

    let summary = harvester.run(cancel).await?;
    print_run_summary(&summary);

    let stats = harvester.statistics()?;
    print_statistics(&stats);

    if stats.error > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
        }
        _ => {
            tracing::warn!("Could not register signal handlers, falling back to Ctrl+C");
            wait_for_ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    park_on_error(tokio::signal::ctrl_c()).await;
}

/// Resolves when `listener` fires; never resolves if it could not be installed
async fn park_on_error(listener: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = listener.await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C, running without signal handling");
        std::future::pending::<()>().await;
    }
}
