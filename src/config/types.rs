use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Reel-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub seeds: SeedsConfig,
    pub output: OutputConfig,
}

/// Concurrency and traversal limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of work items scraped at once
    pub workers: usize,

    /// Watch pages fetched at once within one item
    #[serde(rename = "episode-workers")]
    pub episode_workers: usize,

    /// Server slots fetched at once within one episode
    #[serde(rename = "server-workers")]
    pub server_workers: usize,

    /// Hard cap on the pages walked for one listing
    #[serde(rename = "max-listing-pages")]
    pub max_listing_pages: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            episode_workers: 10,
            server_workers: 4,
            max_listing_pages: 200,
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Sent as the `Referer` header when set
    pub referer: Option<String>,

    /// Set to false for sites with broken certificate chains
    #[serde(rename = "verify-tls")]
    pub verify_tls: bool,

    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,

    /// Politeness delay before every request (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,

    /// Static headers attached to every request (cookies, tokens)
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("reel-harvest/", env!("CARGO_PKG_VERSION")).to_string(),
            referer: None,
            verify_tls: true,
            timeout_secs: 15,
            connect_timeout_secs: 10,
            request_delay_ms: 300,
            headers: BTreeMap::new(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Retry policy for transient fetch failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    #[serde(rename = "backoff-multiplier")]
    pub backoff_multiplier: f64,

    /// Randomize each delay to avoid synchronized retries
    pub jitter: bool,

    /// HTTP statuses treated as transient
    #[serde(rename = "retryable-statuses")]
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }
}

/// Site-specific endpoints, resolved against each seed's origin
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Form endpoint returning one server iframe per `(id, i)` pair
    #[serde(rename = "server-endpoint")]
    pub server_endpoint: Option<String>,

    /// Form endpoint returning the trailer iframe for `href`
    #[serde(rename = "trailer-endpoint")]
    pub trailer_endpoint: Option<String>,

    /// Number of server slots probed per episode
    #[serde(rename = "server-slots")]
    pub server_slots: u32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            server_endpoint: None,
            trailer_endpoint: None,
            server_slots: 10,
        }
    }
}

/// Seed URL sources; files and inline lists are merged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedsConfig {
    #[serde(rename = "movies-file")]
    pub movies_file: Option<PathBuf>,

    #[serde(rename = "series-file")]
    pub series_file: Option<PathBuf>,

    pub movies: Vec<String>,

    pub series: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}
