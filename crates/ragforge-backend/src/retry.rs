//! Retry policy for transient provider and store failures.

use std::future::Future;
use std::time::Duration;

use ragforge_core::{Error, Result};
use tracing::debug;

/// Retries after the initial attempt.
pub const MAX_RETRIES: usize = 3;

/// Backoff before the `retry`-th retry: 500 ms, 1 s, 2 s, capped at 4 s.
pub fn backoff_delay(retry: usize) -> Duration {
    let shift = retry.min(4) as u32;
    Duration::from_millis((500u64 << shift).min(4_000))
}

/// Run `op`, retrying retryable failures up to [`MAX_RETRIES`] times
/// with exponential backoff. Fatal errors surface immediately.
pub async fn with_retry<T, F, Fut>(op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt - 1)).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                debug!("attempt {} failed, will retry: {}", attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| Error::provider_fatal("operation failed after retries", None)))
}
