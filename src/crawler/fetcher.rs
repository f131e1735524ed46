//! HTTP fetch client
//!
//! This module handles every request the crawl makes:
//! - Building the shared reqwest client (user agent, TLS, timeouts, static headers)
//! - Page GETs and the form POSTs the site's ajax endpoints expect
//! - Classifying failures as transient or permanent
//! - Retrying transient failures through [`with_retry`]

use crate::config::{HttpConfig, RetryConfig};
use crate::crawler::retry::with_retry;
use crate::{ConfigError, HarvestError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use url::Url;

/// Builds the shared HTTP client from the `[http]` section
///
/// Static headers (and the referer, when configured) are attached to every
/// request.
pub fn build_http_client(config: &HttpConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();

    for (name, value) in &config.headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConfigError::Validation(format!("header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ConfigError::Validation(format!("header '{}': {}", name, e)))?;
        headers.insert(header, value);
    }

    if let Some(referer) = &config.referer {
        let value = HeaderValue::from_str(referer)
            .map_err(|e| ConfigError::InvalidUrl(format!("referer '{}': {}", referer, e)))?;
        headers.insert(REFERER, value);
    }

    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .danger_accept_invalid_certs(!config.verify_tls)
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Maps a non-success status onto the failure taxonomy
fn classify_status(url: &Url, status: StatusCode, retry: &RetryConfig) -> HarvestError {
    let code = status.as_u16();
    let reason = format!("HTTP {}", code);

    if retry.is_retryable_status(code) {
        HarvestError::TransientFetch {
            url: url.to_string(),
            reason,
        }
    } else {
        HarvestError::PermanentFetch {
            url: url.to_string(),
            status: Some(code),
            reason,
        }
    }
}

/// Maps a transport error onto the failure taxonomy
fn classify_error(url: &Url, error: reqwest::Error) -> HarvestError {
    if error.is_builder() || error.is_redirect() {
        return HarvestError::PermanentFetch {
            url: url.to_string(),
            status: None,
            reason: error.to_string(),
        };
    }

    let reason = if error.is_timeout() {
        "request timeout".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    };

    HarvestError::TransientFetch {
        url: url.to_string(),
        reason,
    }
}

/// Shared client plus the retry policy and politeness delay
#[derive(Debug, Clone)]
pub struct FetchClient {
    client: Client,
    retry: RetryConfig,
    request_delay: Duration,
}

impl FetchClient {
    pub fn new(http: &HttpConfig, retry: &RetryConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(http)?,
            retry: retry.clone(),
            request_delay: http.request_delay(),
        })
    }

    /// Fetches a page body, retrying transient failures
    pub async fn get(&self, url: &Url) -> Result<String> {
        self.execute(url, || self.client.get(url.clone())).await
    }

    /// POSTs a form to an ajax endpoint on behalf of `referer`
    pub async fn post_form(
        &self,
        url: &Url,
        form: &[(&str, &str)],
        referer: &Url,
    ) -> Result<String> {
        self.execute(url, || {
            self.client
                .post(url.clone())
                .header(REFERER, referer.as_str())
                .header("X-Requested-With", "XMLHttpRequest")
                .form(form)
        })
        .await
    }

    async fn execute<F>(&self, url: &Url, build: F) -> Result<String>
    where
        F: Fn() -> RequestBuilder,
    {
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(HarvestError::PermanentFetch {
                url: url.to_string(),
                status: None,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        with_retry(&self.retry, || async {
            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }

            tracing::trace!(url = %url, "Sending request");

            let response = build().send().await.map_err(|e| classify_error(url, e))?;
            let status = response.status();
            if !status.is_success() {
                return Err(classify_status(url, status, &self.retry));
            }

            response.text().await.map_err(|e| classify_error(url, e))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorClass;

    fn url() -> Url {
        Url::parse("https://example.com/series/one/").unwrap()
    }

    #[test]
    fn test_build_http_client() {
        let mut config = HttpConfig::default();
        config.headers.insert("Cookie".to_string(), "session=abc".to_string());
        config.referer = Some("https://example.com/".to_string());
        config.verify_tls = false;

        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_bad_header_is_config_error() {
        let mut config = HttpConfig::default();
        config.headers.insert("Bad Header".to_string(), "x".to_string());

        let err = build_http_client(&config).unwrap_err();
        assert!(matches!(err, HarvestError::Config(_)));
    }

    #[test]
    fn test_status_classification() {
        let retry = RetryConfig::default();

        for code in [429u16, 500, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(
                classify_status(&url(), status, &retry).class(),
                ErrorClass::Transient,
                "{} should be transient",
                code
            );
        }

        for code in [400u16, 403, 404, 410, 501] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(
                classify_status(&url(), status, &retry).class(),
                ErrorClass::Permanent,
                "{} should be permanent",
                code
            );
        }
    }

    #[tokio::test]
    async fn test_non_http_scheme_is_permanent() {
        let client = FetchClient::new(&HttpConfig::default(), &RetryConfig::default()).unwrap();
        let err = client
            .get(&Url::parse("ftp://example.com/file").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarvestError::PermanentFetch { status: None, .. }
        ));
    }
}
