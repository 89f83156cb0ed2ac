//! Transfer-rate limiting using a token bucket
//!
//! The RateGate provides aggregate bandwidth limiting across all concurrent
//! downloads using a lock-free token bucket implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared rate gate for all in-flight downloads
///
/// Uses a token bucket for efficient, lock-free bandwidth limiting. All
/// concurrent downloads share the same bucket, naturally distributing
/// bandwidth based on demand. The limit is fixed for the lifetime of the
/// gate; a run takes its configuration as an immutable snapshot.
///
/// # Algorithm
///
/// - Tokens represent bytes that can be transferred
/// - Tokens refill at a constant rate (`limit_bps`)
/// - Downloads acquire tokens before transferring data
/// - If insufficient tokens, the caller waits until refill
#[derive(Clone)]
pub struct RateGate {
    /// Rate limit in bytes per second (0 = unlimited)
    limit_bps: u64,
    /// Available tokens (current bucket capacity in bytes)
    tokens: Arc<AtomicU64>,
    /// Last refill timestamp (nanoseconds since arbitrary epoch)
    last_refill: Arc<AtomicU64>,
}

impl RateGate {
    /// Create a new RateGate with the specified limit
    ///
    /// # Arguments
    ///
    /// * `limit_bps` - Rate limit in bytes per second (None = unlimited)
    ///
    /// # Examples
    ///
    /// ```
    /// use telegram_media_dl::rate_gate::RateGate;
    ///
    /// // 10 MB/s limit
    /// let gate = RateGate::new(Some(10 * 1024 * 1024));
    ///
    /// // Unlimited
    /// let unlimited = RateGate::new(None);
    /// ```
    #[must_use]
    pub fn new(limit_bps: Option<u64>) -> Self {
        let limit = limit_bps.unwrap_or(0);
        let now = Self::now_nanos();

        Self {
            limit_bps: limit,
            tokens: Arc::new(AtomicU64::new(limit)),
            last_refill: Arc::new(AtomicU64::new(now)),
        }
    }

    /// Get the configured rate limit
    ///
    /// Returns None if unlimited, otherwise the limit in bytes per second.
    pub fn limit(&self) -> Option<u64> {
        if self.limit_bps == 0 {
            None
        } else {
            Some(self.limit_bps)
        }
    }

    /// Acquire permission to transfer the specified number of bytes
    ///
    /// Blocks until sufficient tokens are available. For an unlimited gate
    /// this returns immediately.
    pub async fn acquire(&self, bytes: u64) {
        // Fast path: nothing to acquire, or unlimited
        if bytes == 0 || self.limit_bps == 0 {
            return;
        }

        let mut remaining = bytes;

        loop {
            // Refill tokens based on elapsed time
            self.refill_tokens();

            // Try to consume available tokens (partial consumption allowed)
            let current_tokens = self.tokens.load(Ordering::SeqCst);
            let to_consume = remaining.min(current_tokens);

            if to_consume > 0 {
                if self
                    .tokens
                    .compare_exchange(
                        current_tokens,
                        current_tokens - to_consume,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    remaining -= to_consume;
                    if remaining == 0 {
                        return;
                    }
                }
                // CAS failed or still have remaining, retry immediately
                continue;
            }

            // No tokens available, wait for refill. Sleep is capped at 100ms
            // so large requests make progress in bounded steps.
            let wait_ms = (remaining as f64 / self.limit_bps as f64 * 1000.0) as u64;
            tokio::time::sleep(Duration::from_millis(wait_ms.clamp(10, 100))).await;
        }
    }

    /// Refill tokens based on elapsed time since last refill
    fn refill_tokens(&self) {
        let now = Self::now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);

        let elapsed_nanos = now.saturating_sub(last);
        let elapsed_secs = elapsed_nanos as f64 / 1_000_000_000.0;

        // Bytes per second * seconds elapsed
        let tokens_to_add = (self.limit_bps as f64 * elapsed_secs) as u64;

        if tokens_to_add > 0
            && self
                .last_refill
                .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            // Add tokens, but cap at limit (bucket capacity)
            let current_tokens = self.tokens.load(Ordering::SeqCst);
            let new_tokens = (current_tokens + tokens_to_add).min(self.limit_bps);
            self.tokens.store(new_tokens, Ordering::SeqCst);
        }
    }

    /// Get current monotonic time in nanoseconds
    ///
    /// Uses a monotonic clock that is not affected by system time changes.
    /// The epoch is arbitrary but consistent within a process lifetime.
    fn now_nanos() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}
