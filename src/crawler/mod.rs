//! Crawler module: fetching, traversal and scheduling
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry and backoff
//! - Paginated listing traversal
//! - The per-item scrape pipeline (detail → seasons → episodes → servers)
//! - The worker pool and overall run coordination

mod coordinator;
mod fetcher;
mod pagination;
mod pipeline;
pub mod retry;
mod scheduler;

pub use coordinator::{run_harvest, Harvester};
pub use fetcher::{build_http_client, FetchClient};
pub use pagination::PaginationWalker;
pub use pipeline::ItemPipeline;
pub use scheduler::{ItemScraper, RunSummary, Scheduler};
