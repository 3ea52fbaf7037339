//! Exponential backoff for failed receive calls.

use std::time::Duration;

use rand::Rng;

/// Backoff policy applied by the poll loop after a failed receive.
///
/// ```rust
/// use rs_sqs_consumer::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(5), 2.0)
///     .without_jitter();
/// assert_eq!(policy.delay_for(0), Duration::from_millis(500));
/// assert_eq!(policy.delay_for(10), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive failed receives after which the loop gives up.
    pub max_attempts: u32,

    pub initial_delay: Duration,

    pub max_delay: Duration,

    /// Growth factor applied per consecutive failure.
    pub backoff_multiplier: f64,

    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (0.25 = ±25%).
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-based): `initial * multiplier^attempt`,
    /// capped at `max_delay`, then jittered.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.use_jitter {
            add_jitter(capped, self.jitter_percent)
        } else {
            capped
        };
        Duration::from_secs_f64(delay.max(0.0))
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    pub fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
    let range = delay_secs * jitter_percent;
    if range <= 0.0 {
        return delay_secs;
    }
    let jitter = rand::thread_rng().gen_range(-range..=range);
    delay_secs + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_until_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(1000), 2.0)
            .without_jitter();

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_stays_within_range() {
        let policy = RetryPolicy::new(5, Duration::from_secs(4), Duration::from_secs(4), 2.0)
            .with_jitter_percent(0.25);

        for _ in 0..100 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_secs(3), "{delay:?}");
            assert!(delay <= Duration::from_secs(5), "{delay:?}");
        }
    }

    #[test]
    fn retries_stop_at_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(7));
        assert!(!policy.should_retry(8));
    }
}
