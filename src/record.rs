//! The unit of data moving through the pipeline.

use bytes::Bytes;

/// An opaque byte payload plus its origin coordinates in the log.
///
/// Immutable once read. Owned by the pipeline for the duration of its
/// transit from reader to forwarder, discarded after the sink acknowledges
/// it or the retry policy is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The partition this record was read from.
    pub partition: u64,
    /// The record's offset within its partition.
    pub offset: u64,
    /// The opaque payload.
    pub data: Bytes,
}

impl Record {
    /// Creates a new record with the given origin coordinates.
    pub fn new(partition: u64, offset: u64, data: Bytes) -> Self {
        Self {
            partition,
            offset,
            data,
        }
    }

    /// The payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
