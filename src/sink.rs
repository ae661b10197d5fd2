//! The delivery-stream side of the pipeline.

use crate::error::RelayResult;
use crate::record::Record;

/// A record the sink refused within an otherwise successful append call.
#[derive(Debug, Clone)]
pub struct RejectedRecord {
    /// Position of the record within the submitted batch.
    pub index: usize,
    /// Sink-provided reason, e.g. a throttling code.
    pub reason: String,
}

/// Outcome of an append call the sink processed.
///
/// An empty rejection list means the whole batch is durably accepted.
/// A non-empty list is a partial rejection: the listed records must be
/// resubmitted, everything else is durable.
#[derive(Debug, Clone, Default)]
pub struct AppendResponse {
    /// Records the sink refused, by batch index.
    pub rejected: Vec<RejectedRecord>,
}

impl AppendResponse {
    /// A response acknowledging the entire batch.
    pub fn ack() -> Self {
        Self::default()
    }

    /// Whether every record in the batch was accepted.
    pub fn is_fully_acked(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Capability handle for an append-only delivery stream.
///
/// `append` submits a sealed batch as one call and reports either full
/// acceptance, a partial rejection, or an error. Failures are classified
/// by the implementor: [`crate::error::RelayError::TransientSink`] for
/// retryable conditions (throttling, timeouts) and
/// [`crate::error::RelayError::PermanentSink`] for everything that retrying
/// cannot fix (auth, stream not found). The sink does not retain ownership
/// of records after acknowledgment.
#[async_trait::async_trait]
pub trait DeliverySink
where
    Self: Send + Sync + std::fmt::Debug,
{
    /// Appends a sealed batch to the stream.
    async fn append(&self, records: &[Record]) -> RelayResult<AppendResponse>;
}
