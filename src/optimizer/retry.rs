//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
    /// Fraction of the delay randomised in either direction (0.2 = ±20%).
    pub jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            base,
            max,
            jitter: if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 },
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// A server `Retry-After` hint replaces the computed delay, still capped at `max`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max);
        }
        let exponent = attempt.saturating_sub(1).min(31);
        let raw = self.base.saturating_mul(1u32 << exponent).min(self.max);
        if self.jitter <= 0.0 {
            return raw;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(-self.jitter..self.jitter);
        raw.mul_f64(factor).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_exponentially_without_jitter() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(30), 0.0);
        assert_eq!(backoff.delay_for(1, None), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2, None), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(4, None), Duration::from_millis(800));
    }

    #[test]
    fn capped_at_max() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 0.0);
        assert_eq!(backoff.delay_for(10, None), Duration::from_secs(30));
        assert_eq!(backoff.delay_for(200, None), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_band() {
        let backoff = Backoff::new(Duration::from_millis(1000), Duration::from_secs(30), 0.2);
        for _ in 0..100 {
            let d = backoff.delay_for(1, None);
            assert!(d >= Duration::from_millis(800) && d <= Duration::from_millis(1200), "{:?}", d);
        }
    }

    #[test]
    fn non_finite_jitter_is_ignored() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(30), f64::NAN);
        assert_eq!(backoff.jitter, 0.0);
        assert_eq!(backoff.delay_for(2, None), Duration::from_millis(200));
    }

    #[test]
    fn retry_after_overrides_and_is_capped() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(30), 0.5);
        assert_eq!(
            backoff.delay_for(1, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            backoff.delay_for(1, Some(Duration::from_secs(600))),
            Duration::from_secs(30)
        );
    }
}
