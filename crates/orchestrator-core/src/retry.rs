//! C1: retry policy — deciding whether an error is retryable and computing
//! exponential backoff.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry configuration attached to an executor invocation or a DAG task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    #[serde(default)]
    pub retry_on: Vec<String>,
    #[serde(default)]
    pub skip_on: Vec<String>,
}

/// Maximum backoff delay, in milliseconds, regardless of attempt number.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Decide whether `error` is retryable under `retry`.
///
/// `retry` absent → never retry. `skipOn` dominates `retryOn`: if any
/// `skip_on` pattern matches, the error is never retried even if it would
/// also match `retry_on`. An empty (or absent) `retry_on` means "retry any
/// error" once `skip_on` has cleared it.
pub fn should_retry(error: &str, retry: Option<&RetryConfig>) -> bool {
    let Some(retry) = retry else {
        return false;
    };

    let matches_any = |patterns: &[String]| {
        let error_lower = error.to_lowercase();
        patterns
            .iter()
            .any(|pattern| error_lower.contains(&pattern.to_lowercase()))
    };

    if !retry.skip_on.is_empty() && matches_any(&retry.skip_on) {
        return false;
    }

    if retry.retry_on.is_empty() {
        return true;
    }

    matches_any(&retry.retry_on)
}

/// Exponential backoff, capped at [`MAX_BACKOFF_MS`]. `attempt` is 1-based;
/// attempt 1 always yields `base_ms`.
pub fn calculate_backoff(base_ms: u64, attempt: u32) -> u64 {
    debug_assert!(attempt >= 1, "attempt is 1-based");
    let exponent = attempt.saturating_sub(1);
    let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

/// Anything `runWithRetry` can inspect to decide whether to retry. Mirrors
/// the executor's `TaskResult` shape (§3) without depending on it directly,
/// so the retry loop can be reused for sub-executions (e.g. DAG review
/// calls) that produce a different result type.
pub trait Retryable {
    /// `true` when this attempt should be treated as a success and the
    /// retry loop should stop.
    fn is_success(&self) -> bool;
    /// The error text to test against `retry_on`/`skip_on`, if any.
    fn error_text(&self) -> Option<&str>;
}

/// Run `run_once` up to `retry.max_attempts` times (or exactly once if
/// `retry` is `None`), sleeping an exponentially increasing backoff between
/// attempts. The final returned value is always the most recent attempt's
/// result, never a synthesized aggregate.
pub async fn run_with_retry<T, F, Fut>(retry: Option<&RetryConfig>, mut run_once: F) -> T
where
    T: Retryable,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
{
    let Some(retry) = retry else {
        return run_once(1).await;
    };

    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = run_once(attempt).await;

        if result.is_success() {
            return result;
        }

        let error = result.error_text().unwrap_or_default();
        if !should_retry(error, Some(retry)) {
            tracing::debug!(attempt, error, "error not retryable, giving up");
            return result;
        }
        if attempt >= max_attempts {
            tracing::warn!(attempt, max_attempts, "retry attempts exhausted");
            return result;
        }

        let backoff = calculate_backoff(retry.backoff_ms, attempt);
        tracing::debug!(attempt, backoff_ms = backoff, "retrying after backoff");
        if backoff > 0 {
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
        attempt += 1;
    }
}
