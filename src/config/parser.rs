use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use reel_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Workers: {}", config.crawler.workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Recorded on every run so a changed configuration is visible in the
/// run history.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[crawler]
workers = 4
episode-workers = 6
max-listing-pages = 50

[http]
user-agent = "Mozilla/5.0 (TestHarvester)"
referer = "https://example.com/"
verify-tls = false
request-delay-ms = 0

[http.headers]
Cookie = "session=abc"

[retry]
max-attempts = 3
retryable-statuses = [429, 503]

[site]
server-endpoint = "/ajax/server.php"
server-slots = 4

[seeds]
series-file = "series.json"
movies = ["https://example.com/movie/one/"]

[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.workers, 4);
        assert_eq!(config.crawler.episode_workers, 6);
        // Unset keys keep their defaults
        assert_eq!(config.crawler.server_workers, 4);
        assert!(!config.http.verify_tls);
        assert_eq!(config.http.timeout_secs, 15);
        assert_eq!(config.http.headers.get("Cookie").unwrap(), "session=abc");
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.retry.is_retryable_status(503));
        assert!(!config.retry.is_retryable_status(500));
        assert_eq!(config.site.server_slots, 4);
        assert!(config.site.trailer_endpoint.is_none());
        assert_eq!(config.seeds.movies.len(), 1);
        assert_eq!(
            config.seeds.series_file.as_deref(),
            Some(Path::new("series.json"))
        );
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("[output]\ndatabase-path = \"h.db\"\n").unwrap();

        assert_eq!(config.crawler.workers, 10);
        assert_eq!(config.crawler.max_listing_pages, 200);
        assert!(config.http.verify_tls);
        assert_eq!(config.http.request_delay_ms, 300);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retryable_statuses, vec![429, 500, 502, 503, 504]);
        assert_eq!(config.site.server_slots, 10);
        assert!(config.seeds.movies.is_empty());
    }

    #[test]
    fn test_missing_output_section() {
        let result = parse_config("[crawler]\nworkers = 2\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let config_content = "this is not valid TOML {{{";
        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[crawler]
workers = 0

[output]
database-path = "./test.db"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_load_config_with_hash_matches_file_hash() {
        let file = create_temp_config("[output]\ndatabase-path = \"h.db\"\n");

        let (_, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());

        let other = create_temp_config("[output]\ndatabase-path = \"other.db\"\n");
        assert_ne!(hash, compute_config_hash(other.path()).unwrap());
    }
}
