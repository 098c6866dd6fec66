//! Bounded exponential backoff for transient service errors.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AsrError;

/// Retry policy for a single service request.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts, including the first one. Values below 1 behave as 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

/// Runs `op`, retrying transient failures with doubling delays.
///
/// Fatal errors return immediately. Exhausting the attempt budget wraps the
/// last transient error in [`AsrError::RetriesExhausted`] so the caller can
/// still see how hard we tried.
pub async fn with_backoff<T, F, Fut>(
    config: RetryConfig,
    what: &str,
    mut op: F,
) -> Result<T, AsrError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AsrError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(what, attempt, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) if attempt >= max_attempts => {
                return Err(AsrError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }
            Err(err) => {
                warn!(
                    what,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient service error, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(config.max_backoff);
            }
        }
    }
}
