use crate::config::MIN_RATE_PER_SEC;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep_until};

const MIN_WAIT: Duration = Duration::from_millis(1);

/// Single token bucket that waits for capacity instead of rejecting.
pub struct RateLimiter {
    rate_per_sec: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rate_per_sec: f64, capacity: f64) -> Self {
        let rate_per_sec = if rate_per_sec.is_finite() && rate_per_sec > 0.0 {
            rate_per_sec.max(MIN_RATE_PER_SEC)
        } else {
            1.0
        };
        let capacity = capacity.max(1.0);
        Self {
            rate_per_sec,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token, sleeping until one is available. Returns how long the
    /// caller waited.
    pub async fn acquire(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let ready_at = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                if elapsed > 0.0 {
                    state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
                    state.last_refill = now;
                }
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return waited;
                }
                let deficit = 1.0 - state.tokens;
                // Rounding can leave a sub-nanosecond deficit; never spin on a zero sleep.
                let wait = Duration::try_from_secs_f64(deficit / self.rate_per_sec)
                    .unwrap_or(Duration::from_secs_f64(1.0 / MIN_RATE_PER_SEC));
                now + wait.max(MIN_WAIT)
            };
            let before = Instant::now();
            sleep_until(ready_at).await;
            waited += before.elapsed();
        }
    }
}
