//! Per-fetcher retry policy.

use std::time::Duration;

use log::warn;

use crate::errors::{FetchError, RetryClass};
use crate::models::{PriceRecord, SourceDescriptor};

use super::traits::{FetchRequest, Fetcher};

/// Exponential backoff settings for one fetcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Runs `fetcher` under its own retry policy.
///
/// Only errors classified [`RetryClass::WithBackoff`] are retried; the last
/// error is returned once the attempt budget is spent.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    descriptor: &SourceDescriptor,
    request: &FetchRequest,
) -> Result<Vec<PriceRecord>, FetchError> {
    let policy = fetcher.retry_policy();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match fetcher.fetch(descriptor, request).await {
            Ok(records) => return Ok(records),
            Err(e) if e.retry_class() == RetryClass::WithBackoff && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "Source '{}' attempt {}/{} failed: {}. Retrying in {:?}",
                    descriptor.id, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
