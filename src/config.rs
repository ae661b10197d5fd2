//! Configuration for the relay pipeline.
//!
//! All tunables live in one struct handed to [`crate::relay::Relay`] at
//! construction time and validated once at startup. Resolving these values
//! from files, environment or a runtime properties mapping is the caller's
//! concern, not this crate's.

use std::time::Duration;

use crate::error::{RelayError, RelayResult};

/// Identity of the source log the relay reads from.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Broker addresses of the log cluster.
    pub bootstrap_servers: Vec<String>,
    /// The topic whose partitions are relayed.
    pub topic: String,
    /// Consumer group used for offset coordination.
    pub consumer_group: String,
}

/// Identity of the delivery stream the relay writes to.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Name of the delivery stream.
    pub stream_name: String,
    /// Region or endpoint identifier for the stream.
    pub region: String,
}

/// Bounds that seal a batch, whichever is hit first.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum number of records per batch.
    pub max_records: usize,
    /// Maximum total payload bytes per batch.
    pub max_bytes: usize,
    /// Maximum time a batch may remain open after its first record.
    pub linger: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        // Matches the per-call limits of batched delivery-stream APIs.
        Self {
            max_records: 500,
            max_bytes: 4 * 1024 * 1024,
            linger: Duration::from_secs(1),
        }
    }
}

/// Exponential backoff policy for sink submission retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Cap applied to the exponential delay.
    pub max_delay: Duration,
    /// Maximum number of submission attempts per batch.
    pub max_attempts: u32,
    /// Whether to randomise delays by +/- 25%.
    pub jitter: bool,
    /// Timeout applied to each individual sink call.
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter: true,
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Disable jitter so delays become deterministic.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// The delay to sleep before retry number `attempt` (starting at 1).
    ///
    /// Computed as `min(max_delay, base_delay * 2^(attempt - 1))`, with
    /// optional +/- 25% jitter derived from the clock's subsecond nanos.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let exponent = attempt.saturating_sub(1).min(20);
        let capped_ms = base_ms.saturating_mul(1u64 << exponent).min(max_ms);

        let final_ms = if self.jitter && capped_ms > 0 {
            let range = capped_ms / 4;
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos() as u64;
            capped_ms - range + nanos % (range * 2 + 1)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }
}

/// Top-level configuration for a relay pipeline.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Source log identity.
    pub source: SourceConfig,
    /// Delivery stream identity.
    pub sink: SinkConfig,
    /// Batch sealing bounds.
    pub batch: BatchConfig,
    /// Sink retry policy.
    pub retry: RetryConfig,
    /// Maximum records requested per poll.
    pub poll_max_records: usize,
    /// How long a poll waits for data before returning empty.
    pub poll_timeout: Duration,
    /// Capacity, in records, of the bounded reader-to-forwarder queue.
    pub queue_capacity: usize,
    /// Deadline for the final best-effort submission during shutdown.
    pub shutdown_timeout: Duration,
}

impl RelayConfig {
    /// Creates a configuration with default tuning for the given endpoints.
    pub fn new(source: SourceConfig, sink: SinkConfig) -> Self {
        Self {
            source,
            sink,
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
            poll_max_records: 500,
            poll_timeout: Duration::from_secs(1),
            queue_capacity: 2048,
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    /// Validates the configuration, returning the first offending value.
    pub fn validate(&self) -> RelayResult<()> {
        if self.source.bootstrap_servers.is_empty() {
            return Err(RelayError::Config(
                "source.bootstrap_servers must not be empty".into(),
            ));
        }
        if self.source.topic.is_empty() {
            return Err(RelayError::Config("source.topic must not be empty".into()));
        }
        if self.sink.stream_name.is_empty() {
            return Err(RelayError::Config(
                "sink.stream_name must not be empty".into(),
            ));
        }
        if self.batch.max_records == 0 {
            return Err(RelayError::Config("batch.max_records must be > 0".into()));
        }
        if self.batch.max_bytes == 0 {
            return Err(RelayError::Config("batch.max_bytes must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(RelayError::Config("retry.max_attempts must be > 0".into()));
        }
        if self.poll_max_records == 0 {
            return Err(RelayError::Config("poll_max_records must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(RelayError::Config("queue_capacity must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> RelayConfig {
        RelayConfig::new(
            SourceConfig {
                bootstrap_servers: vec!["broker-1:9092".into()],
                topic: "events".into(),
                consumer_group: "relay".into(),
            },
            SinkConfig {
                stream_name: "delivery".into(),
                region: "us-east-1".into(),
            },
        )
    }

    #[test]
    fn default_config_validates() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn empty_topic_is_rejected() {
        let mut cfg = config();
        cfg.source.topic.clear();
        assert!(matches!(cfg.validate(), Err(RelayError::Config(_))));
    }

    #[test]
    fn zero_batch_bound_is_rejected() {
        let mut cfg = config();
        cfg.batch.max_records = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let retry = RetryConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(450),
            max_attempts: 5,
            jitter: false,
            attempt_timeout: Duration::from_secs(1),
        };

        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(400));
        assert_eq!(retry.delay_for(4), Duration::from_millis(450));
        assert_eq!(retry.delay_for(10), Duration::from_millis(450));
    }

    #[test]
    fn jitter_stays_within_a_quarter_of_the_delay() {
        let retry = RetryConfig::default();
        for attempt in 1..6 {
            let nominal = retry.clone().without_jitter().delay_for(attempt);
            let jittered = retry.delay_for(attempt);
            let lower = nominal - nominal / 4;
            let upper = nominal + nominal / 4;
            assert!(jittered >= lower && jittered <= upper);
        }
    }
}
