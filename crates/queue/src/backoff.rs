//! Exponential backoff for `nack(requeue = true)`.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff: `base * multiplier^attempt`, capped at `max`, with
/// uniform jitter in `[-jitter_fraction, +jitter_fraction]` applied on top.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on the computed delay, before jitter.
    pub max: Duration,
    /// Multiplier applied per successive attempt.
    pub multiplier: f64,
    /// Fractional jitter applied symmetrically, e.g. `0.25` for ±25%.
    pub jitter_fraction: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_fraction: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Compute the delay for a zero-based attempt number, including jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_secs = self.base.as_secs_f64();
        #[allow(clippy::cast_possible_wrap)]
        let raw = base_secs * self.multiplier.powi(attempt as i32);
        let clamped = raw.min(self.max.as_secs_f64());
        let jitter_factor = rand::thread_rng()
            .gen_range(1.0 - self.jitter_fraction..=1.0 + self.jitter_fraction);
        Duration::from_secs_f64((clamped * jitter_factor).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_and_clamps() {
        let policy = BackoffPolicy {
            jitter_fraction: 0.0,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_secs(1));
        // attempt large enough to clamp to max
        assert_eq!(policy.delay_for(20), policy.max);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = BackoffPolicy::default();
        for attempt in 0..5 {
            let delay = policy.delay_for(attempt);
            let base = policy.base.as_secs_f64() * policy.multiplier.powi(attempt as i32);
            let expected_max = base.min(policy.max.as_secs_f64()) * 1.25;
            assert!(delay.as_secs_f64() <= expected_max + f64::EPSILON);
        }
    }
}
