//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for a sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum time since the last successful sync before a reconnect
    /// triggers a new cycle.
    pub reconnect_debounce: Duration,
    /// Upper bound on a single gateway call.
    pub request_timeout: Duration,
    /// Push right after `create_item` when online.
    pub push_on_create: bool,
    /// Prefix of the per-collection pull query label.
    pub pull_query_prefix: String,
    /// Retry configuration for `sync_with_retry`.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            reconnect_debounce: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            push_on_create: false,
            pull_query_prefix: "incsync".into(),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the reconnect debounce window.
    pub fn with_reconnect_debounce(mut self, window: Duration) -> Self {
        self.reconnect_debounce = window;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables or disables the opportunistic push after a create.
    pub fn with_push_on_create(mut self, enabled: bool) -> Self {
        self.push_on_create = enabled;
        self
    }

    /// Sets the pull query prefix.
    pub fn with_pull_query_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pull_query_prefix = prefix.into();
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the stable pull label for a collection, e.g. `incsync_TodoItem`.
    pub fn pull_label(&self, collection: &str) -> String {
        format!("{}_{}", self.pull_query_prefix, collection)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier. Values below 1.0 (and NaN) count as 1.0.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = if multiplier.is_nan() {
            1.0
        } else {
            multiplier.max(1.0)
        };
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Returns the delay before attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        let secs = if self.add_jitter {
            capped * (1.0 + 0.25 * rand::random::<f64>())
        } else {
            capped
        };
        // a hand-set multiplier can still produce NaN or a negative delay
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reconnect_policy() {
        let config = SyncConfig::default();
        assert_eq!(config.reconnect_debounce, Duration::from_secs(10));
        assert!(!config.push_on_create);
        assert_eq!(config.pull_label("TodoItem"), "incsync_TodoItem");
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_reconnect_debounce(Duration::from_secs(2))
            .with_request_timeout(Duration::from_secs(5))
            .with_push_on_create(true)
            .with_pull_query_prefix("delta");

        assert_eq!(config.reconnect_debounce, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(config.push_on_create);
        assert_eq!(config.pull_label("Note"), "delta_Note");
    }

    #[test]
    fn retry_delay_without_jitter() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max_with_jitter() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(6);
        assert!(delay >= Duration::from_secs(5));
        assert!(delay <= Duration::from_millis(6250));
    }

    #[test]
    fn unusable_multiplier_never_panics() {
        for multiplier in [-2.0, 0.0, f64::NAN] {
            let config = RetryConfig::new(5)
                .with_initial_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(1))
                .with_backoff_multiplier(multiplier)
                .with_jitter(false);
            assert_eq!(config.backoff_multiplier, 1.0);
            assert_eq!(config.delay_for_attempt(4), Duration::from_millis(100));
        }

        let mut config = RetryConfig::new(5)
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(false);
        config.backoff_multiplier = -3.0;
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(1));
        config.backoff_multiplier = f64::NAN;
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(1));
    }

    #[test]
    fn no_retry_is_single_attempt() {
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
    }
}
