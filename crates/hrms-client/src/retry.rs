//! Retry policy for transport timeouts with exponential backoff.
//!
//! Only the timeout class of transport failures is retried. Application
//! errors, 5xx included, reach the caller unmodified.

use rand::Rng;
use std::time::Duration;

use crate::error::Error;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff strategy to use.
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential { factor: 2.0 },
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff strategy.
    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Disable retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Backoff strategy for determining retry delays.
#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    /// Constant delay between retries.
    Constant,
    /// Linear increase in delay (delay * (attempt + 1)).
    Linear,
    /// Exponential increase in delay (delay * factor^attempt).
    Exponential { factor: f64 },
    /// Exponential with random jitter on top.
    ExponentialWithJitter { factor: f64 },
}

impl BackoffStrategy {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay(&self, attempt: u32, base_delay: Duration, max_delay: Duration) -> Duration {
        let delay = match self {
            BackoffStrategy::Constant => base_delay,
            BackoffStrategy::Linear => base_delay.saturating_mul(attempt.saturating_add(1)),
            BackoffStrategy::Exponential { factor } => {
                scaled(base_delay, factor.powi(attempt as i32), max_delay)
            }
            BackoffStrategy::ExponentialWithJitter { factor } => {
                let base = scaled(base_delay, factor.powi(attempt as i32), max_delay);
                let jitter = rand::rng().random::<f64>() * base.as_secs_f64();
                base + Duration::from_secs_f64(jitter)
            }
        };

        std::cmp::min(delay, max_delay)
    }
}

fn scaled(base: Duration, multiplier: f64, cap: Duration) -> Duration {
    let secs = base.as_secs_f64() * multiplier;
    if !secs.is_finite() || secs >= cap.as_secs_f64() {
        cap
    } else if secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(secs)
    }
}

/// Decides whether a failed call is retried and how long to wait.
///
/// The per-call counter lives on the request (`ApiRequest::retry_count`), so
/// one policy is shared by every call of a client.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy from config.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// True only for the timeout class of transport failures.
    pub fn should_retry(&self, error: &Error) -> bool {
        error
            .transport_code()
            .map(|code| code.is_timeout())
            .unwrap_or(false)
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        self.config
            .backoff
            .delay(attempt, self.config.base_delay, self.config.max_delay)
    }

    /// Delay before the next retry of a call that has been retried
    /// `retry_count` times, or `None` once the cap is reached.
    pub fn next_delay(&self, retry_count: u32) -> Option<Duration> {
        if retry_count >= self.config.max_retries {
            return None;
        }
        Some(self.compute_delay(retry_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TransportCode};

    fn timeout(code: TransportCode) -> Error {
        Error::new(ErrorKind::Timeout {
            code,
            message: "timeout of 30000ms exceeded".into(),
        })
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_should_retry_only_timeouts() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&timeout(TransportCode::ConnectionAborted)));
        assert!(policy.should_retry(&timeout(TransportCode::TimedOut)));

        let refused = Error::new(ErrorKind::Connectivity {
            code: TransportCode::ConnectFailed,
            message: "connection refused".into(),
        });
        assert!(!policy.should_retry(&refused));

        let server_error = Error::new(ErrorKind::Backend {
            status: 500,
            message: "Internal Server Error".into(),
        });
        assert!(!policy.should_retry(&server_error));

        let gateway_timeout = Error::new(ErrorKind::Backend {
            status: 504,
            message: "Gateway Timeout".into(),
        });
        assert!(!policy.should_retry(&gateway_timeout));
    }

    #[test]
    fn test_compute_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.compute_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.compute_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.compute_delay(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_next_delay_stops_at_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(0), Some(Duration::from_millis(1000)));
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(2000)));
        assert_eq!(policy.next_delay(2), None);
        assert_eq!(policy.next_delay(7), None);
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::new(RetryConfig::no_retry());
        assert_eq!(policy.next_delay(0), None);
    }

    #[test]
    fn test_constant_and_linear_backoff() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(60);
        assert_eq!(BackoffStrategy::Constant.delay(5, base, max), base);
        assert_eq!(
            BackoffStrategy::Linear.delay(2, base, max),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_exponential_caps_at_max() {
        let strategy = BackoffStrategy::Exponential { factor: 2.0 };
        let delay = strategy.delay(40, Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(delay, Duration::from_secs(60));
    }

    #[test]
    fn test_exponential_with_jitter_bounds() {
        let strategy = BackoffStrategy::ExponentialWithJitter { factor: 2.0 };
        let delay = strategy.delay(1, Duration::from_secs(1), Duration::from_secs(60));
        assert!(delay >= Duration::from_secs(2));
        assert!(delay <= Duration::from_secs(4));
    }

    #[test]
    fn test_non_positive_factor_never_goes_negative() {
        let base = Duration::from_millis(100);
        let cap = Duration::from_secs(30);
        for factor in [-2.0, 0.0] {
            for attempt in 0..4 {
                let delay = BackoffStrategy::Exponential { factor }.delay(attempt, base, cap);
                assert!(delay <= cap);
                let delay = BackoffStrategy::ExponentialWithJitter { factor }.delay(attempt, base, cap);
                assert!(delay <= cap);
            }
        }
        assert_eq!(
            BackoffStrategy::Exponential { factor: -2.0 }.delay(1, base, cap),
            Duration::ZERO
        );
    }
}
