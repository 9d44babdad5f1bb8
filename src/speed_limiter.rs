//! Bandwidth limiting using a token bucket
//!
//! Tokens represent bytes that may be written; they refill at the configured
//! rate and the bucket capacity (burst) equals the rate. Writers acquire
//! tokens before forwarding data and wait for refills when the bucket runs
//! dry. The wait is cancellable so an aborted download never blocks on the
//! limiter.

use crate::error::{Error, Result};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Token-bucket rate limiter with rate and burst both equal to the
/// configured bytes per second.
///
/// Lock-free: token counts and the refill timestamp are atomics, so
/// concurrent writers sharing one limiter never contend on a mutex.
#[derive(Debug)]
pub struct SpeedLimiter {
    /// Steady rate and bucket capacity, in bytes per second
    limit_bps: u64,
    /// Available tokens (bytes that may be written now)
    tokens: AtomicU64,
    /// Last refill timestamp (nanoseconds since an arbitrary epoch)
    last_refill: AtomicU64,
}

impl SpeedLimiter {
    /// Create a limiter admitting `limit_bps` bytes per second, starting
    /// with a full bucket.
    pub fn new(limit_bps: u64) -> Self {
        Self {
            limit_bps,
            tokens: AtomicU64::new(limit_bps),
            last_refill: AtomicU64::new(Self::now_nanos()),
        }
    }

    /// The configured rate in bytes per second
    pub fn limit(&self) -> u64 {
        self.limit_bps
    }

    /// Acquire permission to write `bytes` bytes, waiting for refills as
    /// needed.
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires while waiting; any
    /// tokens consumed before the cancellation stay consumed.
    pub async fn acquire(&self, bytes: u64, cancel: &CancellationToken) -> Result<()> {
        if bytes == 0 || self.limit_bps == 0 {
            return Ok(());
        }

        let mut remaining = bytes;
        loop {
            self.refill_tokens();

            // Partial consumption is allowed so large requests drain the
            // bucket incrementally instead of starving behind small ones.
            let current = self.tokens.load(Ordering::SeqCst);
            let to_consume = remaining.min(current);
            if to_consume > 0 {
                if self
                    .tokens
                    .compare_exchange(
                        current,
                        current - to_consume,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    remaining -= to_consume;
                    if remaining == 0 {
                        return Ok(());
                    }
                }
                continue;
            }

            // Bucket is empty; sleep roughly until enough tokens exist,
            // capped so cancellation is observed promptly.
            let wait_ms = (remaining as f64 / self.limit_bps as f64 * 1000.0) as u64;
            tokio::select! {
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(Duration::from_millis(wait_ms.clamp(10, 100))) => {}
            }
        }
    }

    /// Refill tokens based on the time elapsed since the last refill,
    /// capping at the bucket capacity.
    fn refill_tokens(&self) {
        let now = Self::now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);

        let elapsed_secs = now.saturating_sub(last) as f64 / 1_000_000_000.0;
        let tokens_to_add = (self.limit_bps as f64 * elapsed_secs) as u64;
        if tokens_to_add == 0 {
            return;
        }

        if self
            .last_refill
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let current = self.tokens.load(Ordering::SeqCst);
            let new_tokens = current.saturating_add(tokens_to_add).min(self.limit_bps);
            self.tokens.store(new_tokens, Ordering::SeqCst);
        }
    }

    /// Monotonic time in nanoseconds since the first call in this process.
    fn now_nanos() -> u64 {
        static START: OnceLock<Instant> = OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_bucket_admits_a_burst_immediately() {
        let limiter = SpeedLimiter::new(1_000_000);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        limiter.acquire(1_000_000, &cancel).await.unwrap();

        assert!(
            start.elapsed() < Duration::from_millis(50),
            "a burst up to the bucket capacity should not wait"
        );
    }

    #[tokio::test]
    async fn acquire_zero_bytes_returns_immediately() {
        let limiter = SpeedLimiter::new(100);
        limiter.tokens.store(0, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        let start = Instant::now();
        limiter.acquire(0, &cancel).await.unwrap();

        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn drained_bucket_waits_for_refill() {
        let rate_bps = 1_000;
        let limiter = SpeedLimiter::new(rate_bps);
        limiter.tokens.store(0, Ordering::SeqCst);
        limiter
            .last_refill
            .store(SpeedLimiter::now_nanos(), Ordering::SeqCst);
        let cancel = CancellationToken::new();

        // 500 bytes at 1000 B/s should take roughly 500ms
        let start = Instant::now();
        limiter.acquire(500, &cancel).await.unwrap();
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(250),
            "acquire should have waited for tokens, only took {elapsed:?}"
        );
        assert!(
            elapsed <= Duration::from_millis(1500),
            "acquire took too long: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn cancellation_aborts_a_waiting_acquire() {
        // 1 B/s: acquiring 10 KiB would take hours without cancellation
        let limiter = SpeedLimiter::new(1);
        limiter.tokens.store(0, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel_clone.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            limiter.acquire(10 * 1024, &cancel),
        )
        .await
        .expect("acquire should return promptly after cancellation");

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn concurrent_acquires_share_the_refill_rate() {
        let rate_bps = 2_000;
        let limiter = std::sync::Arc::new(SpeedLimiter::new(rate_bps));
        limiter.tokens.store(0, Ordering::SeqCst);
        limiter
            .last_refill
            .store(SpeedLimiter::now_nanos(), Ordering::SeqCst);

        // 4 tasks x 500 bytes at 2000 B/s: roughly 1 second in total
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(500, &CancellationToken::new()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(500),
            "concurrent acquires finished too fast: {elapsed:?}"
        );
        assert!(
            elapsed <= Duration::from_millis(3000),
            "concurrent acquires took too long: {elapsed:?}"
        );
    }
}
