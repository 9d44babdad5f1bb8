//! Retry logic with exponential backoff
//!
//! Wraps a part-fetch attempt with a bounded retry budget. After failed
//! attempt `i` (0-indexed) the controller sleeps `1s * 2^i` before trying
//! again; no delay precedes the first attempt and none follows the last
//! failure. Cancellation is returned immediately, never retried.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Base delay doubled after every failed attempt
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Run `operation` up to `retries` times with exponential backoff.
///
/// On exhaustion, returns [`Error::RetriesExhausted`] wrapping the part
/// index, the attempt count, and the last underlying cause. The backoff
/// sleep itself is cancellable.
pub(crate) async fn with_retries<F, Fut, T>(
    part_index: usize,
    retries: usize,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let retries = retries.max(1);
    let mut last_err = None;

    for attempt in 0..retries {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(
                        part = part_index,
                        attempts = attempt + 1,
                        "part fetch succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                if attempt + 1 < retries {
                    let delay = BASE_DELAY * (1u32 << attempt.min(31));
                    warn!(
                        part = part_index,
                        attempt = attempt + 1,
                        max_attempts = retries,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "part fetch failed, retrying"
                    );
                    last_err = Some(err);
                    tokio::select! {
                        () = cancel.cancelled() => return Err(Error::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                } else {
                    last_err = Some(err);
                }
            }
        }
    }

    Err(Error::RetriesExhausted {
        index: part_index,
        attempts: retries,
        source: Box::new(last_err.unwrap_or(Error::Cancelled)),
    })
}
