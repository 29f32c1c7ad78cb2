//! Exponential backoff schedule with jitter for rate-limit retries.

use std::time::Duration;

use rand::Rng;

/// Backoff policy: `base * factor^attempt`, capped, with a random jitter
/// fraction applied on top.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    /// Fraction of the delay randomized in `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2.0,
            cap: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl Backoff {
    /// Deterministic delay for `attempt` (0-based), before jitter.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let exp = self.factor.powi(attempt.min(16) as i32);
        let millis = self.base.as_millis() as f64 * exp;
        Duration::from_millis(millis as u64).min(self.cap)
    }

    /// Jittered delay for `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = self.raw_delay(attempt);
        if self.jitter <= 0.0 {
            return raw;
        }
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        let millis = raw.as_millis() as f64 * factor;
        Duration::from_millis(millis as u64).min(self.cap)
    }
}
