//! Pure utility functions for generation calls

use rand::Rng;
use std::time::Duration;

use shared::{ApiFailure, RetryConfig};

/// Decide whether to retry after a failed attempt (pure apart from jitter).
///
/// `attempt` is the 1-based number of the attempt that just failed. Returns the
/// delay before the next attempt, or `None` when the failure is permanent or
/// the attempt ceiling is reached.
pub fn retry_delay(failure: &ApiFailure, attempt: u32, retry: &RetryConfig) -> Option<Duration> {
    if attempt >= retry.max_attempts || !failure.is_retryable() {
        return None;
    }

    let backoff = retry.backoff_for(attempt);
    let jitter_ceiling = (backoff.as_millis() as u64) / 10;
    let jitter = if jitter_ceiling > 0 {
        Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ceiling))
    } else {
        Duration::ZERO
    };

    // A server-provided wait is a floor, not a suggestion
    let delay = match failure.retry_after() {
        Some(server_wait) => (backoff + jitter).max(server_wait),
        None => backoff + jitter,
    };
    Some(delay)
}

/// Rough token estimate for a content call: prompt size plus the completion cap
pub fn estimate_content_units(prompt: &str, max_tokens: u32) -> u64 {
    let prompt_tokens = (prompt.chars().count() as u64).div_ceil(4);
    prompt_tokens + max_tokens as u64
}
