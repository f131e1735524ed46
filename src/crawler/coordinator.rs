//! Harvest coordination
//!
//! This module wires the crawl together:
//! - Opening the store and seeding it from the configured lists
//! - Recording the run (and closing out a run that never finished)
//! - Building the fetch client, parser and item pipeline
//! - Driving the scheduler until drained or cancelled

use crate::config::Config;
use crate::crawler::fetcher::FetchClient;
use crate::crawler::pipeline::ItemPipeline;
use crate::crawler::scheduler::{lock_unpoisoned, RunSummary, Scheduler};
use crate::parser::{PageParser, SiteParser};
use crate::storage::{
    open_storage, CatalogQuery, CrawlStatistics, CrawlStore, RunStatus, SqliteStorage,
};
use crate::Result;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Owns the store and the item pipeline for one invocation
pub struct Harvester {
    config: Config,
    config_hash: String,
    storage: Arc<Mutex<SqliteStorage>>,
    pipeline: Arc<ItemPipeline>,
}

impl Harvester {
    /// Creates a harvester using the built-in site parser
    ///
    /// Opens (or creates) the database named in `[output]`.
    pub fn new(config: Config, config_hash: impl Into<String>) -> Result<Self> {
        Self::with_parser(config, config_hash, Arc::new(SiteParser::new()))
    }

    /// Creates a harvester with a custom page parser
    pub fn with_parser(
        config: Config,
        config_hash: impl Into<String>,
        parser: Arc<dyn PageParser>,
    ) -> Result<Self> {
        let storage = open_storage(Path::new(&config.output.database_path))?;
        let fetcher = FetchClient::new(&config.http, &config.retry)?;
        let pipeline = ItemPipeline::new(
            fetcher,
            parser,
            config.crawler.clone(),
            config.site.clone(),
        );

        Ok(Self {
            config,
            config_hash: config_hash.into(),
            storage: Arc::new(Mutex::new(storage)),
            pipeline: Arc::new(pipeline),
        })
    }

    /// Shared handle to the store, for queries after a run
    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        self.storage.clone()
    }

    /// Current counters of the store
    pub fn statistics(&self) -> Result<CrawlStatistics> {
        Ok(lock_unpoisoned(&self.storage).statistics()?)
    }

    /// Inserts configured seeds that are not yet known; returns how many were new
    pub fn seed(&self) -> Result<usize> {
        let seeds = self.config.seeds.collect()?;
        let inserted = lock_unpoisoned(&self.storage).seed(&seeds)?;
        tracing::info!(seeds = seeds.len(), inserted, "Seed lists loaded");
        Ok(inserted)
    }

    /// Seeds the store and runs the scheduler to completion or cancellation
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        self.seed()?;

        let run_id = {
            let mut storage = lock_unpoisoned(&self.storage);
            if let Some(previous) = storage.get_latest_run()? {
                if previous.status == RunStatus::Running {
                    tracing::warn!(
                        run_id = previous.id,
                        "Previous run did not finish, its items will be resumed"
                    );
                    storage.finish_run(previous.id, RunStatus::Interrupted)?;
                }
            }
            storage.create_run(&self.config_hash)?
        };

        tracing::info!(run_id, "Starting harvest run");
        let started = Instant::now();

        let scheduler = Scheduler::new(
            self.storage.clone(),
            self.pipeline.clone(),
            run_id,
            self.config.crawler.workers,
            cancel,
        );
        let outcome = scheduler.run().await;

        let status = match &outcome {
            Ok(summary) if summary.interrupted => RunStatus::Interrupted,
            Ok(_) => RunStatus::Completed,
            Err(_) => RunStatus::Failed,
        };
        lock_unpoisoned(&self.storage).finish_run(run_id, status)?;

        let summary = outcome?;
        tracing::info!(
            run_id,
            claimed = summary.claimed,
            completed = summary.completed,
            failed = summary.failed,
            deferred = summary.deferred,
            lost_claims = summary.lost_claims,
            interrupted = summary.interrupted,
            elapsed_secs = started.elapsed().as_secs(),
            "Harvest run finished"
        );

        Ok(summary)
    }
}

/// Runs a complete harvest with the built-in site parser
///
/// ```no_run
/// use reel_harvest::config::load_config_with_hash;
/// use reel_harvest::crawler::run_harvest;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let summary = run_harvest(config, hash, CancellationToken::new()).await?;
/// println!("{} completed", summary.completed);
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(
    config: Config,
    config_hash: String,
    cancel: CancellationToken,
) -> Result<RunSummary> {
    let harvester = Harvester::new(config, config_hash)?;
    harvester.run(cancel).await
}
