// lib/src/retry.rs

use std::fmt::Display;
use std::future::Future;
use log::warn;
use tokio::time::{sleep, Duration};

/// Retries a fallible async operation with exponential backoff: up to
/// `max_attempts` calls, delay doubling from `initial_delay_ms` between
/// attempts, no jitter. The last error is returned once attempts are
/// exhausted.
pub async fn retry_with_backoff<T, E, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    initial_delay_ms: u64,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut delay = Duration::from_millis(initial_delay_ms);
    let mut last_error = None;

    for attempt in 1..=max_attempts.max(1) {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                warn!(
                    "Attempt {}/{} failed: {}",
                    attempt,
                    max_attempts.max(1),
                    error
                );
                last_error = Some(error);
                if attempt < max_attempts {
                    sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    Err(last_error.expect("at least one attempt runs"))
}
