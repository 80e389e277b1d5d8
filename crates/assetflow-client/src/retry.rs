//! Retry with linear backoff for rate-limited requests.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Run `f`, retrying retryable failures up to `max_retries` times.
///
/// The wait before retry `n` (1-based) is `base_delay × n`. Non-retryable
/// errors are returned immediately; once retries are exhausted the last
/// error is returned.
pub async fn with_retry<F, Fut, T>(max_retries: u32, base_delay: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let backoff = base_delay * attempt;
                tracing::warn!(
                    attempt,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Request rate limited, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
