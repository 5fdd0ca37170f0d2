use chrono::Duration;

/// Bounded exponential retry delays: `min(cap, base * 2^retry)`.
///
/// No jitter: the delay feeds the order's persisted `next_attempt_at`, which
/// tests pin down with a manual clock, and a handful of dispatch workers is
/// not enough traffic to need smearing.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    base: Duration,
    cap: Duration,
}

impl RetryBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// The delay before the attempt following `retry_count` completed
    /// failures.
    pub fn delay_for(&self, retry_count: i32) -> Duration {
        let exponent = retry_count.clamp(0, 30) as u32;
        let factor = 2i64.saturating_pow(exponent);
        let delay = Duration::seconds(self.base.num_seconds().saturating_mul(factor));
        delay.min(self.cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_retry() {
        let backoff = RetryBackoff::new(Duration::seconds(2), Duration::seconds(300));
        assert_eq!(backoff.delay_for(0), Duration::seconds(2));
        assert_eq!(backoff.delay_for(1), Duration::seconds(4));
        assert_eq!(backoff.delay_for(2), Duration::seconds(8));
        assert_eq!(backoff.delay_for(3), Duration::seconds(16));
    }

    #[test]
    fn caps_at_the_configured_maximum() {
        let backoff = RetryBackoff::new(Duration::seconds(2), Duration::seconds(10));
        assert_eq!(backoff.delay_for(5), Duration::seconds(10));
        assert_eq!(backoff.delay_for(60), Duration::seconds(10));
    }

    #[test]
    fn negative_retry_count_is_treated_as_zero() {
        let backoff = RetryBackoff::new(Duration::seconds(2), Duration::seconds(300));
        assert_eq!(backoff.delay_for(-1), Duration::seconds(2));
    }
}
