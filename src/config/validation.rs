use crate::config::types::{
    Config, CrawlerConfig, HttpConfig, OutputConfig, RetryConfig, SeedsConfig, SiteConfig,
};
use crate::ConfigError;
use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_http_config(&config.http)?;
    validate_retry_config(&config.retry)?;
    validate_site_config(&config.site)?;
    validate_seeds_config(&config.seeds)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    if config.episode_workers < 1 || config.episode_workers > 100 {
        return Err(ConfigError::Validation(format!(
            "episode-workers must be between 1 and 100, got {}",
            config.episode_workers
        )));
    }

    if config.server_workers < 1 || config.server_workers > 100 {
        return Err(ConfigError::Validation(format!(
            "server-workers must be between 1 and 100, got {}",
            config.server_workers
        )));
    }

    if config.max_listing_pages < 1 {
        return Err(ConfigError::Validation(
            "max-listing-pages must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "connect-timeout-secs must be >= 1".to_string(),
        ));
    }

    if let Some(referer) = &config.referer {
        Url::parse(referer)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid referer '{}': {}", referer, e)))?;
    }

    for (name, value) in &config.headers {
        HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            ConfigError::Validation(format!("Invalid header name '{}'", name))
        })?;
        HeaderValue::from_str(value).map_err(|_| {
            ConfigError::Validation(format!("Invalid value for header '{}'", name))
        })?;
    }

    Ok(())
}

/// Validates the retry policy
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    if !(config.backoff_multiplier >= 1.0 && config.backoff_multiplier.is_finite()) {
        return Err(ConfigError::Validation(format!(
            "backoff-multiplier must be a finite number >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base-delay-ms ({}) cannot exceed max-delay-ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
    }

    for status in &config.retryable_statuses {
        if !(400..=599).contains(status) {
            return Err(ConfigError::Validation(format!(
                "retryable status {} is not an HTTP error status",
                status
            )));
        }
    }

    Ok(())
}

/// Validates site endpoints
///
/// An endpoint is either an absolute path on the seed's origin or a full URL.
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    for (name, endpoint) in [
        ("server-endpoint", &config.server_endpoint),
        ("trailer-endpoint", &config.trailer_endpoint),
    ] {
        let Some(endpoint) = endpoint else {
            continue;
        };
        if endpoint.starts_with('/') {
            continue;
        }
        let url = Url::parse(endpoint)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, endpoint, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "{} '{}' must use http or https",
                name, endpoint
            )));
        }
    }

    if config.server_endpoint.is_some() && config.server_slots == 0 {
        return Err(ConfigError::Validation(
            "server-slots must be >= 1 when server-endpoint is set".to_string(),
        ));
    }

    Ok(())
}

/// Validates inline seed URLs
///
/// Seed files are data, not configuration; their entries are checked when
/// an item is scraped.
fn validate_seeds_config(config: &SeedsConfig) -> Result<(), ConfigError> {
    for seed in config.movies.iter().chain(config.series.iter()) {
        let url = Url::parse(seed.trim())
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
