use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default number of attempts per request.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Statuses treated as transient by default.
pub const DEFAULT_RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Computes the pause before attempt `n + 1` after attempt `n` failed.
pub type Backoff = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Retry policy applied by [`Client::send_with_retry`](crate::Client::send_with_retry).
///
/// Requests whose body is a stream are sent exactly once regardless of
/// `count`.
#[derive(Clone)]
pub struct RetryOptions {
    /// Total attempts, including the first one. `0` behaves like `1`.
    pub count: u32,
    pub backoff: Backoff,
    pub retry_statuses: Vec<u16>,
}

impl RetryOptions {
    /// Never retries.
    pub fn disabled() -> Self {
        Self {
            count: 1,
            ..Self::default()
        }
    }

    /// Exponential backoff starting at `base` and doubling per attempt.
    pub fn exponential(count: u32, base: Duration) -> Self {
        Self {
            count,
            backoff: Arc::new(move |attempt| base * 2u32.saturating_pow(attempt.saturating_sub(1))),
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }

    /// Fixed pause between attempts.
    pub fn constant(count: u32, pause: Duration) -> Self {
        Self {
            count,
            backoff: Arc::new(move |_| pause),
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.count.max(1)
    }

    pub(crate) fn delay(&self, attempt: u32) -> Duration {
        (self.backoff)(attempt)
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self::exponential(DEFAULT_RETRY_COUNT, Duration::from_millis(200))
    }
}

impl fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOptions")
            .field("count", &self.count)
            .field("retry_statuses", &self.retry_statuses)
            .finish_non_exhaustive()
    }
}
