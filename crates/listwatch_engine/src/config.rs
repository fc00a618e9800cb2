//! Configuration for the list-watch engine.

use rand::Rng;
use std::time::Duration;

/// Configuration for one synchronization loop.
#[derive(Debug, Clone)]
pub struct ListWatchConfig {
    /// Name used in logs, typically the watched resource type.
    pub name: String,
    /// Wall-clock bound on a single List call, from call start to bookmark.
    pub list_timeout: Duration,
    /// Ends a Watch that delivers nothing for this long. `None` keeps idle
    /// watches open indefinitely.
    pub watch_idle_timeout: Option<Duration>,
    /// Backoff between failed attempts.
    pub retry: RetryConfig,
    /// Restricts the lister to one cloud account.
    pub cloud_account_id: Option<String>,
}

impl ListWatchConfig {
    /// Creates a new configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            list_timeout: Duration::from_secs(60),
            watch_idle_timeout: None,
            retry: RetryConfig::default(),
            cloud_account_id: None,
        }
    }

    /// Sets the List timeout.
    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    /// Sets the idle Watch bound.
    pub fn with_watch_idle_timeout(mut self, timeout: Duration) -> Self {
        self.watch_idle_timeout = Some(timeout);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Restricts the lister to one cloud account.
    pub fn with_cloud_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.cloud_account_id = Some(account_id.into());
        self
    }
}

impl Default for ListWatchConfig {
    fn default() -> Self {
        Self::new("resources")
    }
}

/// Configuration for retry backoff.
///
/// The loop retries forever; only the delay between attempts is bounded.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration that retries immediately.
    pub fn no_backoff() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay after `failures` consecutive failures.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter && delay_secs > 0.0 {
            // Add up to 25% jitter
            let jitter = delay_secs * rand::thread_rng().gen_range(0.0..=0.25);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_watch_config_builder() {
        let config = ListWatchConfig::new("vpcs")
            .with_list_timeout(Duration::from_secs(5))
            .with_watch_idle_timeout(Duration::from_secs(30))
            .with_cloud_account_id("123456789012");

        assert_eq!(config.name, "vpcs");
        assert_eq!(config.list_timeout, Duration::from_secs(5));
        assert_eq!(config.watch_idle_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.cloud_account_id.as_deref(), Some("123456789012"));
    }

    #[test]
    fn default_config() {
        let config = ListWatchConfig::default();
        assert_eq!(config.list_timeout, Duration::from_secs(60));
        assert!(config.watch_idle_timeout.is_none());
    }

    #[test]
    fn no_backoff_is_zero() {
        let config = RetryConfig::no_backoff();
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(10), Duration::ZERO);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(Duration::from_millis(100)).with_backoff_multiplier(2.0);

        // No failures, no delay
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        // Jitter makes exact values unpredictable, but we can check bounds
        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(126));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }
}
