//! Remote data retrieval with bounded retries.

mod client;
pub mod erddap;

pub use client::{ErddapClient, FetchedPayload, GridServer, RemoteDataClient};
pub use erddap::{build_queries, DimRange, GriddapQuery};

use metrics::counter;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Outcome of a single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Transient: network error, timeout, 5xx/408/429, unreadable body
    Retryable(String),
    /// Permanent: other 4xx, malformed request
    Fatal(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Retryable(msg) => write!(f, "retryable: {}", msg),
            AttemptError::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

/// Exponential backoff: the delay doubles after each failure up to a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }
}

/// Run `op` until it succeeds, fails fatally, or the attempt budget runs out.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        counter!("ingest_fetch_attempts_total").increment(1);

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(message)) => {
                warn!(op = label, attempt, error = %message, "Fetch failed permanently");
                return Err(FetchError::Fatal(message));
            }
            Err(AttemptError::Retryable(message)) => {
                if attempt >= policy.max_attempts {
                    warn!(op = label, attempt, error = %message, "Fetch retries exhausted");
                    return Err(FetchError::Exhausted {
                        attempts: attempt,
                        last_error: message,
                    });
                }

                let delay = policy.delay_after(attempt);
                warn!(
                    op = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
