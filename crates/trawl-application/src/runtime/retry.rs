//! Typed retry combinator.
//!
//! Policies are values; wrapping happens at the call site instead of via
//! decorators, so every retried operation is visible in the code that
//! performs it.

use std::future::Future;
use std::time::Duration;

use trawl_domain::error::{Error, Result};

/// A retry schedule: bounded attempts with capped exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Ceiling for the computed delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Policy for chatty provider APIs (embeddings, index writes).
    #[must_use]
    pub const fn provider_default() -> Self {
        Self::new(3, Duration::from_millis(500), Duration::from_secs(30))
    }

    /// Delay before retry number `attempt` (1-based count of failures so
    /// far): `base * 2^(attempt-1)`, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(u32::try_from(factor).unwrap_or(u32::MAX))
            .min(self.max_delay)
    }
}

/// Run `operation` under `policy`.
///
/// Rate-limited errors sleep at least the server-provided delay instead of
/// the backoff schedule; other errors back off exponentially. The last
/// error surfaces once attempts are exhausted.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(err);
                }
                let delay = match err.rate_limit_delay_secs() {
                    Some(secs) => Duration::from_secs(secs).max(policy.base_delay),
                    None => policy.delay_for(attempt),
                };
                tracing::warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Like [`retry`], but rate limits do not consume attempts.
///
/// Used where a throttled server should never convert into a failed run as
/// long as it keeps answering; a separate wall-clock budget bounds the
/// total wait.
pub async fn retry_honoring_rate_limits<T, F, Fut>(
    policy: RetryPolicy,
    budget: Duration,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let deadline = tokio::time::Instant::now() + budget;
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(err);
                }
                let delay = if let Some(secs) = err.rate_limit_delay_secs() {
                    Duration::from_secs(secs).max(Duration::from_secs(1))
                } else {
                    attempt += 1;
                    if attempt >= policy.max_attempts {
                        return Err(err);
                    }
                    policy.delay_for(attempt)
                };
                tracing::warn!(
                    operation = label,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Convenience: classify an error as worth retrying at all.
///
/// Validation failures and invalid arguments never heal on retry.
#[must_use]
pub fn is_retryable(err: &Error) -> bool {
    !matches!(
        err,
        Error::ConnectorValidation(_) | Error::InvalidArgument { .. } | Error::ConfigInvalid { .. }
    )
}
