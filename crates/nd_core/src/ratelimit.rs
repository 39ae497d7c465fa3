use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep_until, Instant};

/// Pacing gate that keeps at least `min_delay` between calls made through it.
///
/// Callers only hold the internal lock while reserving their slot; the wait
/// itself and the network call that follows happen outside of it.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Waits until `min_delay` has passed since the previous slot and
    /// records the new watermark.
    pub async fn await_slot(&self) {
        let slot = {
            let mut last_call = match self.last_call.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let now = Instant::now();
            let slot = match *last_call {
                Some(previous) => (previous + self.min_delay).max(now),
                None => now,
            };
            *last_call = Some(slot);
            slot
        };

        if slot > Instant::now() {
            tracing::debug!(
                wait_ms = (slot - Instant::now()).as_millis() as u64,
                "Rate limiting: waiting before next call"
            );
            sleep_until(slot).await;
        }
    }
}

/// Exponential backoff with jitter on the upper half:
/// `base * factor^attempt * (0.5 + U[0,1))`.
pub fn compute_backoff(attempt: u32, base_delay: Duration, factor: f64) -> Duration {
    let jitter: f64 = rand::thread_rng().gen();
    backoff_with_jitter(attempt, base_delay, factor, jitter)
}

/// Deterministic core of [`compute_backoff`]; `jitter` is clamped to `[0, 1]`.
pub fn backoff_with_jitter(attempt: u32, base_delay: Duration, factor: f64, jitter: f64) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let scale = factor.powi(exponent) * (0.5 + jitter.clamp(0.0, 1.0));
    let secs = base_delay.as_secs_f64() * scale;
    if secs.is_finite() {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::MAX
    }
}
