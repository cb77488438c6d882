//! Retry with exponential backoff for transient store failures
//!
//! Only errors for which [`lexr_common::Error::is_retryable`] holds are
//! retried (timeouts, SQLite busy/locked). Anything else is returned on the
//! first attempt.

use lexr_common::Result;
use std::time::Duration;

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Run `operation` up to `1 + max_retries` times.
///
/// **Backoff Strategy:**
/// - Initial delay: 10ms
/// - Max delay: 1000ms
/// - Multiplier: 2.0
///
/// Returns the operation's result and the number of attempts made.
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    max_retries: u32,
    mut operation: F,
) -> (Result<T>, u32)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return (Ok(value), attempt);
            }
            Err(err) if err.is_retryable() && attempt <= max_retries => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms,
                    error = %err,
                    "Transient store failure, will retry after backoff"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
            Err(err) => return (Err(err), attempt),
        }
    }
}
