//! Retry with exponential backoff
//!
//! One policy for every request the crawl makes: up to `max-attempts` tries,
//! delays growing from `base-delay-ms` by `backoff-multiplier` and capped at
//! `max-delay-ms`, with optional jitter. Only transient failures are retried.

use crate::config::RetryConfig;
use crate::{ErrorClass, HarvestError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Errors that know whether another attempt could succeed
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for HarvestError {
    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of attempts
///
/// The last error is returned unchanged once attempts are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    let mut delay = config.base_delay();

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(attempts = attempt, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let wait = if config.jitter { add_jitter(delay) } else { delay };

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "Request failed, retrying"
                );

                tokio::time::sleep(wait).await;

                attempt += 1;
                delay = next_delay(delay, config);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(error = %e, attempts = attempt, "Retry attempts exhausted");
                }
                return Err(e);
            }
        }
    }
}

fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    let grown = delay.as_secs_f64() * config.backoff_multiplier;
    let capped = grown.min(config.max_delay().as_secs_f64());
    Duration::from_secs_f64(capped.max(0.0))
}

/// Stretches `delay` by a uniform factor in [1, 2)
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
