// Bounded retry with exponential backoff for segment fetching.

use rand::RngExt;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::DownloadError;
use crate::hls::config::HlsFetcherConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never zero.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Adds up to base_delay/2 of random delay, staying under `max_delay`.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_fetcher_config(config: &HlsFetcherConfig) -> Self {
        Self {
            max_attempts: config.max_segment_attempts.max(1),
            base_delay: config.segment_retry_delay_base,
            max_delay: config.max_segment_retry_delay,
            jitter: true,
        }
    }

    /// Delay after the given failed attempt (0-indexed).
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let exp_delay = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay);
        let capped = exp_delay.min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        let remaining_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::rng().random_range(0..jitter_limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// What a single attempt produced.
pub enum RetryAction<T> {
    Success(T),
    /// Transient failure; another attempt may succeed.
    Retry(DownloadError),
    /// Terminal failure; stop immediately.
    Fail(DownloadError),
}

/// Run `operation` until it succeeds, fails terminally or runs out of attempts.
///
/// `operation` receives the 0-indexed attempt number. The error of the last
/// attempt is returned on failure.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation: F,
) -> Result<T, DownloadError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => {
                if attempt + 1 >= max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
