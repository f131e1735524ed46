//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::state::ItemStatus;
use crate::storage::{
    CrawlStatistics, RunRecord, RunStatus, SeedItem, ShowSubtree, ShowSummary, StoredShow,
    WorkItem,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Work item not found: {0}")]
    ItemNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid status transition for {url}: {from:?} -> {to:?}")]
    InvalidTransition {
        url: String,
        from: ItemStatus,
        to: ItemStatus,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The crawl state machine and run bookkeeping
///
/// Every method is a short synchronous transaction. Callers share one store
/// behind a mutex and must never hold it across an await point.
pub trait CrawlStore {
    // ===== Run Management =====

    /// Creates a new run and returns its id
    ///
    /// The run id is the claim owner: items left `in_progress` by any
    /// other run are treated as abandoned.
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Work Items =====

    /// Inserts missing items as `pending`, leaving existing ones untouched
    ///
    /// Returns the number of newly inserted items.
    fn seed(&mut self, items: &[SeedItem]) -> StorageResult<usize>;

    /// Items that are `pending` or `in_progress`, in seed order
    fn load_pending(&self) -> StorageResult<Vec<WorkItem>>;

    /// Atomically moves an item to `in_progress` for `run_id`
    ///
    /// Succeeds for a `pending` item, or an `in_progress` item claimed by a
    /// different run. At most one caller wins.
    fn claim(&mut self, url: &str, run_id: i64) -> StorageResult<bool>;

    /// Replaces the show for `url` with `subtree` and marks the item `completed`
    ///
    /// All-or-nothing. The item must be `in_progress`.
    fn commit(&mut self, url: &str, subtree: &ShowSubtree) -> StorageResult<()>;

    /// Marks an `in_progress` item `error` with a truncated reason
    fn fail(&mut self, url: &str, reason: &str) -> StorageResult<()>;

    /// Returns the listed items to `pending`, deleting their subtrees
    ///
    /// Unknown URLs are ignored. Returns the number of items reset.
    fn reset(&mut self, urls: &[String]) -> StorageResult<usize>;

    /// Resets every item in `error`
    fn reset_errors(&mut self) -> StorageResult<usize>;

    /// Gets a single work item by URL
    fn get_item(&self, url: &str) -> StorageResult<Option<WorkItem>>;
}

/// Read-only queries over committed data
///
/// Anything returned here was visible the moment its `commit` returned.
pub trait CatalogQuery {
    /// Counts items per status and rows per catalog table
    fn statistics(&self) -> StorageResult<CrawlStatistics>;

    /// All items in `status`, in seed order
    fn items_by_status(&self, status: ItemStatus) -> StorageResult<Vec<WorkItem>>;

    /// Loads a show and its whole subtree by show id
    fn get_show(&self, show_id: i64) -> StorageResult<Option<StoredShow>>;

    /// Loads a show and its whole subtree by the seed URL that produced it
    fn get_subtree(&self, source_url: &str) -> StorageResult<Option<StoredShow>>;

    /// Case-insensitive substring match on titles
    fn search_shows(&self, term: &str, limit: usize) -> StorageResult<Vec<ShowSummary>>;
}
