//! Bounded retry with linear backoff.
//!
//! The single retry primitive shared by chain-write call sites (identifier
//! reconciliation in admission and settlement). Linear schedule: with a 1s
//! base, attempt 1 fails → sleep 1s, attempt 2 fails → sleep 2s, attempt 3
//! fails → give up and propagate the last error.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `op` up to `attempts` times, sleeping `base * n` after the n-th
/// failure. Returns the first success or the last error.
pub async fn retry_linear<T, E, F, Fut>(
    attempts: u32,
    base: Duration,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                warn!("{}: attempt {}/{} failed: {}", label, attempt, attempts, e);
                if attempt >= attempts {
                    return Err(e);
                }
                tokio::time::sleep(base * attempt).await;
                attempt += 1;
            }
        }
    }
}
