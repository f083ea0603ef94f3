use std::time::Duration;

use crate::config::ApiConfig;

/// Upper bound on a single rate-limit wait.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(15 * 60);

/// Bounded exponential backoff for GitHub requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            max_attempts: api.max_retries.max(1),
            base_delay: Duration::from_secs(api.rate_limit_delay),
        }
    }

    /// Delay before retrying after the zero-based `attempt` failed: base, 2×base, 4×base…
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(MAX_RATE_LIMIT_WAIT)
            .min(MAX_RATE_LIMIT_WAIT)
    }

    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}

/// How long GitHub asked us to wait, if the response was a rate limit.
///
/// `Retry-After` (seconds) wins. Otherwise an exhausted primary limit
/// (`X-RateLimit-Remaining: 0`) waits until `X-RateLimit-Reset` (epoch
/// seconds) plus one second.
pub fn rate_limit_wait(
    retry_after: Option<&str>,
    remaining: Option<&str>,
    reset: Option<&str>,
    now_epoch: i64,
) -> Option<Duration> {
    if let Some(secs) = retry_after.and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs).min(MAX_RATE_LIMIT_WAIT));
    }
    if remaining.map(str::trim) != Some("0") {
        return None;
    }
    let reset = reset.and_then(|v| v.trim().parse::<i64>().ok())?;
    let wait = (reset - now_epoch + 1).max(1) as u64;
    Some(Duration::from_secs(wait).min(MAX_RATE_LIMIT_WAIT))
}

/// Sleep before retry `attempt + 1`.
pub async fn backoff_sleep(wait: Duration, attempt: u32, max_attempts: u32, reason: &str) {
    log::warn!(
        "{reason}. Waiting {}s before retry {}/{}",
        wait.as_secs(),
        attempt + 1,
        max_attempts.saturating_sub(1)
    );
    tokio::time::sleep(wait).await;
}
