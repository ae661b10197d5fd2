//! Error types for the relay pipeline.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors surfaced by the relay pipeline.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A commit was issued with an offset below the already committed one.
    /// Benign race between concurrent commits, logged and ignored by callers.
    #[error("stale commit for partition {partition}: offset {offset} < committed {committed}")]
    InvalidOffset {
        /// Partition the commit was addressed to.
        partition: u64,
        /// The stale offset that was handed in.
        offset: u64,
        /// The offset already committed for the partition.
        committed: u64,
    },

    /// Retryable sink failure (throttling, timeout).
    #[error("transient sink failure: {0}")]
    TransientSink(String),

    /// Non-retryable sink failure (auth, malformed record, stream not found).
    #[error("permanent sink failure: {0}")]
    PermanentSink(String),

    /// The source connection is lost. Retried with backoff indefinitely.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A batch exhausted its retry budget. Fatal for the affected partition,
    /// since dropping it would break at-least-once delivery.
    #[error("sink retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// How many submission attempts were made.
        attempts: u32,
        /// Description of the final attempt's failure.
        last_error: String,
    },

    /// A configuration value failed validation at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The reader-to-forwarder channel closed unexpectedly.
    #[error("pipeline channel closed")]
    ChannelClosed,

    /// A pipeline task panicked or was cancelled.
    #[error("pipeline task failed: {0}")]
    Task(String),

    /// Generic error for arbitrary failures that should still convey information.
    #[error("{0}")]
    Generic(String),
}

impl RelayError {
    /// Whether a submission attempt that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RelayError::TransientSink(_))
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RelayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RelayError::ChannelClosed
    }
}

impl From<tokio::task::JoinError> for RelayError {
    fn from(value: tokio::task::JoinError) -> Self {
        RelayError::Task(value.to_string())
    }
}
