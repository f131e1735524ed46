//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - The work item state machine (seed, claim, commit, fail, reset)
//! - Atomic replacement of a show's subtree
//! - Run tracking and resumption support
//! - Read-only catalog queries

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{CatalogQuery, CrawlStore, StorageError, StorageResult};

use crate::state::{ItemStatus, MediaKind};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Maximum number of characters kept from a failure reason
pub const MAX_ERROR_LEN: usize = 500;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> crate::Result<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A seed URL waiting to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedItem {
    pub url: String,
    pub kind: MediaKind,
}

impl SeedItem {
    pub fn new(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// Represents a work item in the database
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub id: i64,
    pub url: String,
    pub kind: MediaKind,
    pub status: ItemStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub claimed_run: Option<i64>,
    pub updated_at: String,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A show and everything it owns, written and replaced as one unit
#[derive(Debug, Clone, PartialEq)]
pub struct ShowSubtree {
    pub source_url: String,
    pub title: String,
    pub kind: MediaKind,
    pub rating: Option<String>,
    pub poster_url: Option<String>,
    pub synopsis: Option<String>,
    pub trailer_url: Option<String>,
    /// Translated metadata key -> values in page order
    pub metadata: BTreeMap<String, Vec<String>>,
    pub seasons: Vec<SeasonRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonRecord {
    pub season_number: i64,
    pub poster_url: Option<String>,
    pub episodes: Vec<EpisodeRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecord {
    pub episode_number: f64,
    pub servers: Vec<ServerRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub server_number: u32,
    pub embed_url: String,
}

/// Reasons a scraped subtree is rejected before it reaches the store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubtreeError {
    #[error("show has an empty title")]
    EmptyTitle,

    #[error("season {0} appears more than once")]
    DuplicateSeason(i64),

    #[error("season {season} has a non-finite episode number")]
    NonFiniteEpisode { season: i64 },

    #[error("season {season} lists episode {episode} more than once")]
    DuplicateEpisode { season: i64, episode: f64 },

    #[error("season {season} episode {episode} lists server {server} more than once")]
    DuplicateServer {
        season: i64,
        episode: f64,
        server: u32,
    },
}

impl ShowSubtree {
    /// Checks the uniqueness rules the schema relies on
    ///
    /// A series does not need a season 1; numbering may start anywhere.
    pub fn validate(&self) -> Result<(), SubtreeError> {
        if self.title.trim().is_empty() {
            return Err(SubtreeError::EmptyTitle);
        }

        let mut seasons = HashSet::new();
        for season in &self.seasons {
            if !seasons.insert(season.season_number) {
                return Err(SubtreeError::DuplicateSeason(season.season_number));
            }

            let mut episodes = HashSet::new();
            for episode in &season.episodes {
                if !episode.episode_number.is_finite() {
                    return Err(SubtreeError::NonFiniteEpisode {
                        season: season.season_number,
                    });
                }
                if !episodes.insert(episode.episode_number.to_bits()) {
                    return Err(SubtreeError::DuplicateEpisode {
                        season: season.season_number,
                        episode: episode.episode_number,
                    });
                }

                let mut servers = HashSet::new();
                for server in &episode.servers {
                    if !servers.insert(server.server_number) {
                        return Err(SubtreeError::DuplicateServer {
                            season: season.season_number,
                            episode: episode.episode_number,
                            server: server.server_number,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Orders seasons, episodes and servers ascending by number
    pub fn sort(&mut self) {
        self.seasons.sort_by_key(|s| s.season_number);
        for season in &mut self.seasons {
            season
                .episodes
                .sort_by(|a, b| a.episode_number.total_cmp(&b.episode_number));
            for episode in &mut season.episodes {
                episode.servers.sort_by_key(|s| s.server_number);
            }
        }
    }

    pub fn episode_count(&self) -> usize {
        self.seasons.iter().map(|s| s.episodes.len()).sum()
    }

    pub fn server_count(&self) -> usize {
        self.seasons
            .iter()
            .flat_map(|s| s.episodes.iter())
            .map(|e| e.servers.len())
            .sum()
    }
}

/// A committed show as read back from the store
#[derive(Debug, Clone)]
pub struct StoredShow {
    pub id: i64,
    pub scraped_at: String,
    pub subtree: ShowSubtree,
}

/// One row of a title search
#[derive(Debug, Clone)]
pub struct ShowSummary {
    pub id: i64,
    pub source_url: String,
    pub title: String,
    pub kind: MediaKind,
    pub rating: Option<String>,
    pub season_count: u64,
    pub episode_count: u64,
}

/// Aggregate counts over the whole store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub error: u64,
    pub shows: u64,
    pub seasons: u64,
    pub episodes: u64,
    pub servers: u64,
}

impl CrawlStatistics {
    pub fn total_items(&self) -> u64 {
        self.pending + self.in_progress + self.completed + self.error
    }
}

/// Truncates a failure reason to [`MAX_ERROR_LEN`] characters
pub fn truncate_reason(reason: &str) -> String {
    reason.chars().take(MAX_ERROR_LEN).collect()
}
