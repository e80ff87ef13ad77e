use std::time::Duration;

use async_trait::async_trait;

/// How the delay grows between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed,
    Exponential { factor: u32, max_delay: Duration },
}

/// Bounded retry schedule for opening connections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, delay: Duration, factor: u32, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Exponential { factor, max_delay },
        }
    }

    /// Always at least one attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after the `failed`-th consecutive failure (1-based).
    pub fn delay_after(&self, failed: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { factor, max_delay } => {
                let multiplier = factor.max(1).saturating_pow(failed.saturating_sub(1));
                self.delay.saturating_mul(multiplier).min(max_delay)
            }
        }
    }
}

/// Something that can wait. Swapped out in tests to observe the schedule.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(2));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(4), Duration::from_secs(2));
    }

    #[test]
    fn exponential_delay_doubles_up_to_cap() {
        let policy =
            RetryPolicy::exponential(6, Duration::from_millis(100), 2, Duration::from_millis(500));
        let delays: Vec<_> = (1..=5).map(|n| policy.delay_after(n).as_millis()).collect();
        assert_eq!(delays, [100, 200, 400, 500, 500]);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).attempts(), 1);
    }
}
