//! Bounded retry with backoff for outbound calls.

use std::fmt::Display;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry an async operation a bounded number of times.
///
/// # Arguments
/// * `operation` - the async operation to retry; every attempt reuses
///   the same logical request
/// * `max_attempts` - total attempt budget, inclusive of the first
/// * `base_delay` - delay before the second attempt; later attempts wait
///   `base_delay * attempt_number`
/// * `is_transient` - only errors this classifier accepts are retried;
///   anything else surfaces immediately
///
/// # Returns
/// The first success, or the last error once the budget is spent or a
/// non-transient error occurs.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_attempts: usize,
    base_delay: Duration,
    is_transient: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);

    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_attempts && is_transient(&e) => {
                let delay = base_delay * u32::try_from(attempt).unwrap_or(u32::MAX);
                warn!(
                    "request failed (attempt {attempt}/{max_attempts}): {e}. Retrying after {}ms...",
                    delay.as_millis()
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
