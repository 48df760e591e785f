//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for a transfer to the center.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Center address (`host:port`).
    pub center_addr: String,
    /// Longest wait for any single acknowledgement.
    pub ack_timeout: Duration,
    /// Longest wait for the stream to the center to open.
    pub connect_timeout: Duration,
    /// Longest wait for the center to take one packet set off the wire.
    pub send_timeout: Duration,
    /// Retry configuration for the store connection.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(center_addr: impl Into<String>) -> Self {
        Self {
            center_addr: center_addr.into(),
            ack_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the per-acknowledgement timeout.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Sets the stream open timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-packet-set send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("127.0.0.1:7400")
    }
}

/// Configuration for connect retries.
///
/// The delay between attempts is fixed.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of connect attempts, including the first.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::from_millis(500),
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Sets the delay between attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns the delay before `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.delay
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(20)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("center.local:7400")
            .with_ack_timeout(Duration::from_secs(5))
            .with_connect_timeout(Duration::from_secs(2))
            .with_send_timeout(Duration::from_secs(3))
            .with_retry(RetryConfig::no_retry());

        assert_eq!(config.center_addr, "center.local:7400");
        assert_eq!(config.ack_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.send_timeout, Duration::from_secs(3));
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn default_retry_is_twenty_fixed_delays() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 20);
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(20), Duration::from_millis(500));
    }
}
