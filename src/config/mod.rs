//! Configuration module for Reel-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and reading the seed lists they point at.
//!
//! # Example
//!
//! ```no_run
//! use reel_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvester will use {} workers", config.crawler.workers);
//! ```

mod parser;
mod seeds;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, HttpConfig, OutputConfig, RetryConfig, SeedsConfig, SiteConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use seeds::load_seed_file;
