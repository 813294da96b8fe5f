use std::time::Duration;

use rand::Rng;

/// How a delivery task paces retransmissions to a silent peer.
///
/// The default is a fixed one second interval, retried until acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// Factor applied to the wait after each unanswered attempt; 1.0 keeps it fixed.
    pub backoff: f64,
    pub max_interval: Duration,
    /// None retries forever.
    pub max_attempts: Option<u32>,
    /// Fraction of the wait added as uniform random spread.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::fixed(Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn fixed(interval: Duration) -> Self {
        RetryPolicy {
            interval,
            backoff: 1.0,
            max_interval: interval,
            max_attempts: None,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_backoff(mut self, backoff: f64, max_interval: Duration) -> Self {
        self.backoff = backoff;
        self.max_interval = max_interval;
        self
    }

    pub fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff <= 1.0 {
            return current;
        }
        // Factors too large for a Duration saturate at the cap.
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff)
            .map_or(self.max_interval, |next| next.min(self.max_interval))
    }

    /// The wait actually used for one attempt.
    pub fn spread(&self, wait: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return wait;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        wait + wait.mul_f64(extra)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}
