//! Exponential backoff with jitter for worker restarts.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
    jitter_ratio: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.max(Duration::from_millis(1));
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
            attempts: 0,
            jitter_ratio: 0.2,
        }
    }

    /// Failures recorded since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.base;
        self.attempts = 0;
    }

    /// Record a failure and return how long to wait before the next attempt.
    /// The first failure waits `base`, each later one doubles up to `max`.
    pub fn fail(&mut self) -> Duration {
        if self.attempts > 0 {
            self.current = self.current.saturating_mul(2).min(self.max);
        }
        self.attempts = self.attempts.saturating_add(1);
        add_jitter(self.current, self.jitter_ratio)
    }
}

fn add_jitter(delay: Duration, ratio: f64) -> Duration {
    if !(0.0..=1.0).contains(&ratio) || delay.is_zero() {
        return delay;
    }
    let jitter = delay.mul_f64(ratio * rand::rng().random::<f64>());
    delay + jitter
}
