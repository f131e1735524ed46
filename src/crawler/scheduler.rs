//! Worker pool driving items from `pending` to a terminal status
//!
//! This module handles:
//! - Loading the resumable items (`pending` and orphaned `in_progress`)
//! - Running a fixed number of workers in a `JoinSet`
//! - Claiming each item through the store before scraping it
//! - Committing or failing the item once its pipeline returns
//! - Graceful drain: on cancellation no new claims are made, in-flight items finish
//!
//! The store's conditional claim is the only coordination between workers.

use crate::storage::{CrawlStore, ShowSubtree, WorkItem};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Turns one claimed work item into its complete subtree
#[async_trait]
pub trait ItemScraper: Send + Sync {
    async fn scrape(&self, item: &WorkItem) -> Result<ShowSubtree>;
}

/// Counters for one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items this run claimed
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    /// Items left `in_progress` because the store rejected their commit or failure
    pub deferred: usize,
    /// Items another worker or process claimed first
    pub lost_claims: usize,
    /// True when the run stopped on a shutdown signal
    pub interrupted: bool,
}

impl RunSummary {
    fn merge(&mut self, other: RunSummary) {
        self.claimed += other.claimed;
        self.completed += other.completed;
        self.failed += other.failed;
        self.deferred += other.deferred;
        self.lost_claims += other.lost_claims;
    }
}

/// Locks shared state; poisoning does not invalidate the store or the queue
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounded pool of workers over the store's resumable items
pub struct Scheduler<S> {
    store: Arc<Mutex<S>>,
    scraper: Arc<dyn ItemScraper>,
    run_id: i64,
    workers: usize,
    cancel: CancellationToken,
}

impl<S> Scheduler<S>
where
    S: CrawlStore + Send + 'static,
{
    pub fn new(
        store: Arc<Mutex<S>>,
        scraper: Arc<dyn ItemScraper>,
        run_id: i64,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            scraper,
            run_id,
            workers: workers.max(1),
            cancel,
        }
    }

    /// Runs until no claimable items remain or the token is cancelled
    pub async fn run(&self) -> Result<RunSummary> {
        let pending = lock_unpoisoned(&self.store).load_pending()?;
        let total = pending.len();
        tracing::info!(items = total, workers = self.workers, run_id = self.run_id, "Scheduling items");

        let queue = Arc::new(Mutex::new(VecDeque::from(pending)));
        let mut set = JoinSet::new();

        for worker_id in 0..self.workers.min(total) {
            set.spawn(worker_loop(
                worker_id,
                self.store.clone(),
                queue.clone(),
                self.scraper.clone(),
                self.run_id,
                self.cancel.clone(),
            ));
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(tally) => summary.merge(tally),
                Err(e) => tracing::error!(error = %e, "Worker task panicked"),
            }
        }

        summary.interrupted = self.cancel.is_cancelled();
        Ok(summary)
    }
}

async fn worker_loop<S>(
    worker_id: usize,
    store: Arc<Mutex<S>>,
    queue: Arc<Mutex<VecDeque<WorkItem>>>,
    scraper: Arc<dyn ItemScraper>,
    run_id: i64,
    cancel: CancellationToken,
) -> RunSummary
where
    S: CrawlStore + Send + 'static,
{
    let mut tally = RunSummary::default();

    loop {
        if cancel.is_cancelled() {
            tracing::debug!(worker_id, "Shutdown requested, worker stopping");
            break;
        }

        let Some(item) = lock_unpoisoned(&queue).pop_front() else {
            break;
        };

        let claimed = lock_unpoisoned(&store).claim(&item.url, run_id);
        match claimed {
            Ok(true) => tally.claimed += 1,
            Ok(false) => {
                tracing::debug!(worker_id, url = %item.url, "Item already claimed");
                tally.lost_claims += 1;
                continue;
            }
            Err(e) => {
                tracing::error!(worker_id, url = %item.url, error = %e, "Claim failed");
                tally.deferred += 1;
                continue;
            }
        }

        tracing::info!(worker_id, url = %item.url, kind = %item.kind, "Scraping item");

        match scraper.scrape(&item).await {
            Ok(subtree) => {
                let episodes = subtree.episode_count();
                let committed = lock_unpoisoned(&store).commit(&item.url, &subtree);
                match committed {
                    Ok(()) => {
                        tracing::info!(
                            worker_id,
                            url = %item.url,
                            seasons = subtree.seasons.len(),
                            episodes,
                            "Item completed"
                        );
                        tally.completed += 1;
                    }
                    Err(e) => {
                        tracing::error!(worker_id, url = %item.url, error = %e, "Commit failed, item stays retriable");
                        tally.deferred += 1;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(worker_id, url = %item.url, class = ?e.class(), error = %e, "Item failed");
                let recorded = lock_unpoisoned(&store).fail(&item.url, &e.to_string());
                match recorded {
                    Ok(()) => tally.failed += 1,
                    Err(store_err) => {
                        tracing::error!(worker_id, url = %item.url, error = %store_err, "Could not record failure");
                        tally.deferred += 1;
                    }
                }
            }
        }
    }

    tally
}
