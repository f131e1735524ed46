//! Reel-Harvest: a resumable catalog harvester
//!
//! This crate crawls a paginated streaming catalog (shows, seasons, episodes and
//! their embed servers) and persists every show as one atomic subtree in SQLite.
//! Crawl progress lives in the database, so an interrupted run resumes where it
//! stopped without duplicating or losing work.

pub mod config;
pub mod crawler;
pub mod output;
pub mod parser;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Reel-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transient fetch failure for {url}: {reason}")]
    TransientFetch { url: String, reason: String },

    #[error("Permanent fetch failure for {url}: {reason}")]
    PermanentFetch {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Seed list error: {0}")]
    Seed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`HarvestError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying: timeouts, resets, 429 and 5xx responses
    Transient,
    /// Never retried: 404, malformed URLs, other client errors
    Permanent,
    /// The page did not contain what the parser needs
    Parse,
    /// The store failed; the item stays retriable
    Store,
    /// Everything else
    Other,
}

impl HarvestError {
    /// Maps the error onto the crawl's failure taxonomy
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::TransientFetch { .. } => ErrorClass::Transient,
            Self::PermanentFetch { .. } | Self::UrlParse(_) => ErrorClass::Permanent,
            Self::Parse { .. } => ErrorClass::Parse,
            Self::Storage(_) | Self::Database(_) => ErrorClass::Store,
            _ => ErrorClass::Other,
        }
    }

    pub(crate) fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Reel-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Harvester, RunSummary};
pub use state::{ItemStatus, MediaKind};
