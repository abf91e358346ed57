//! Retry with exponential backoff for CRM REST calls
//!
//! Only idempotent calls (script fetch, transcript save) go through the
//! retry loop; synthesis requests and interest notifications never do.

use std::time::{Duration, SystemTime};

/// Retry policy for CRM REST calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Determine whether an HTTP status and response body indicate a
/// recoverable error worth retrying: rate limits (429), server errors
/// (5xx), and transient network-level failures surfaced in the body text.
#[must_use]
pub fn is_recoverable(status: u16, body: &str) -> bool {
    if status == 429 {
        return true;
    }

    if (500..600).contains(&status) {
        return true;
    }

    let lower = body.to_lowercase();
    lower.contains("connection reset")
        || lower.contains("timed out")
        || lower.contains("dns error")
}

/// Compute the delay before the next retry attempt.
///
/// When `retry_after` is provided (e.g. from a `Retry-After` header), that
/// value is used directly but capped at `policy.max_delay`. Otherwise the
/// delay follows exponential backoff:
/// `min(base_delay * 2^attempt + jitter, max_delay)`.
///
/// Jitter is 0-25% of the computed delay, derived from `SystemTime` to
/// avoid pulling in a full random number generator.
#[must_use]
pub fn delay_for_attempt(
    policy: &RetryPolicy,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(ra) = retry_after {
        return ra.min(policy.max_delay);
    }

    let base = policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt));
    let base = base.min(policy.max_delay);

    let jitter_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    // Scale to 0-25% of the base delay
    let jitter_fraction = f64::from(jitter_nanos % 250) / 1000.0;
    let jitter = base.mul_f64(jitter_fraction);

    (base + jitter).min(policy.max_delay)
}
