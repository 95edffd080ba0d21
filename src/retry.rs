use crate::error::{GithubError, LlmError};
use std::fmt::Display;
use std::time::Duration;
use tokio::time::sleep;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 1000;
const MAX_DELAY_MS: u64 = 60000;

/// Errors that know whether another attempt could succeed.
pub trait Retryable: Display {
    fn is_retryable(&self) -> bool;
    fn retry_after_ms(&self) -> Option<u64>;
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        LlmError::is_retryable(self)
    }

    fn retry_after_ms(&self) -> Option<u64> {
        LlmError::retry_after_ms(self)
    }
}

impl Retryable for GithubError {
    fn is_retryable(&self) -> bool {
        GithubError::is_retryable(self)
    }

    fn retry_after_ms(&self) -> Option<u64> {
        GithubError::retry_after_ms(self)
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
        }
    }
}

impl RetryConfig {
    fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.base_delay_ms.saturating_mul(factor), self.max_delay_ms)
    }
}

pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;

                let delay_ms = e
                    .retry_after_ms()
                    .map(|ms| ms.min(config.max_delay_ms))
                    .unwrap_or_else(|| config.backoff_ms(attempt));

                tracing::warn!(
                    "Request failed (attempt {}/{}), retrying in {}ms: {}",
                    attempt,
                    config.max_retries,
                    delay_ms,
                    e
                );

                sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
