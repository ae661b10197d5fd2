//! Size- and time-bounded batches of records awaiting submission.

use std::time::Instant;

use uuid::Uuid;

use crate::config::BatchConfig;
use crate::record::Record;

/// Lifecycle of a batch.
///
/// `Accumulating -> Sealed -> Submitting -> {Acked, PartiallyRejected, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Open, accepting records from the reader.
    Accumulating,
    /// Closed to new records, awaiting submission.
    Sealed,
    /// Handed to the sink's append call.
    Submitting,
    /// Every record durably accepted.
    Acked,
    /// A subset of records was rejected and must be resubmitted.
    PartiallyRejected,
    /// The append call failed as a whole.
    Failed,
}

/// Which bound sealed a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealReason {
    /// The record-count bound was reached.
    RecordCount,
    /// The byte-size bound was reached.
    ByteSize,
    /// The linger timeout expired.
    Linger,
    /// The pipeline is shutting down and drains what it has.
    Drain,
}

/// An ordered run of records from one partition, sealed when a bound is
/// hit and then submitted atomically as one sink call.
#[derive(Debug)]
pub struct Batch {
    id: Uuid,
    records: Vec<Record>,
    byte_size: usize,
    opened_at: Option<Instant>,
    state: BatchState,
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

impl Batch {
    /// Creates an empty accumulating batch.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            records: Vec::new(),
            byte_size: 0,
            opened_at: None,
            state: BatchState::Accumulating,
        }
    }

    /// Creates an accumulating batch seeded with requeued records.
    pub fn seeded(records: Vec<Record>) -> Self {
        let byte_size = records.iter().map(Record::len).sum();
        let opened_at = (!records.is_empty()).then(Instant::now);
        Self {
            id: Uuid::new_v4(),
            records,
            byte_size,
            opened_at,
            state: BatchState::Accumulating,
        }
    }

    /// Identifier used to correlate log lines across submission attempts.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total payload bytes in the batch.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// The records accumulated so far.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Consumes the batch, yielding its records.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// The highest record offset in the batch.
    pub fn highest_offset(&self) -> Option<u64> {
        self.records.iter().map(|r| r.offset).max()
    }

    /// When the first record arrived, starting the linger clock.
    pub fn opened_at(&self) -> Option<Instant> {
        self.opened_at
    }

    /// Appends a record. Only valid while accumulating.
    pub fn push(&mut self, record: Record) {
        debug_assert_eq!(self.state, BatchState::Accumulating);
        if self.opened_at.is_none() {
            self.opened_at = Some(Instant::now());
        }
        self.byte_size += record.len();
        self.records.push(record);
    }

    /// The size bound hit by the batch, if any. The linger bound is
    /// time-driven and checked by the forwarder's accumulation loop.
    pub fn size_bound_hit(&self, cfg: &BatchConfig) -> Option<SealReason> {
        if self.records.len() >= cfg.max_records {
            Some(SealReason::RecordCount)
        } else if self.byte_size >= cfg.max_bytes {
            Some(SealReason::ByteSize)
        } else {
            None
        }
    }

    /// Whether `record` can be added without crossing the byte bound.
    ///
    /// An empty batch always accepts: a record larger than the bound on
    /// its own would otherwise never ship. Everywhere else the invariant
    /// `byte_size <= max_bytes` holds for sealed batches.
    pub fn fits(&self, record: &Record, cfg: &BatchConfig) -> bool {
        self.is_empty() || self.byte_size + record.len() <= cfg.max_bytes
    }

    /// Closes the batch to new records.
    pub fn seal(&mut self, reason: SealReason) {
        debug_assert_eq!(self.state, BatchState::Accumulating);
        tracing::debug!(
            batch_id = %self.id,
            records = self.records.len(),
            bytes = self.byte_size,
            ?reason,
            "sealing batch"
        );
        self.state = BatchState::Sealed;
    }

    /// Marks the batch as handed to the sink.
    pub fn begin_submission(&mut self) {
        debug_assert!(matches!(
            self.state,
            BatchState::Sealed | BatchState::PartiallyRejected | BatchState::Failed
        ));
        self.state = BatchState::Submitting;
    }

    /// Marks every record as durably accepted.
    pub fn mark_acked(&mut self) {
        debug_assert_eq!(self.state, BatchState::Submitting);
        self.state = BatchState::Acked;
    }

    /// Marks the batch as partially rejected.
    pub fn mark_partially_rejected(&mut self) {
        debug_assert_eq!(self.state, BatchState::Submitting);
        self.state = BatchState::PartiallyRejected;
    }

    /// Marks the whole append call as failed.
    pub fn mark_failed(&mut self) {
        debug_assert_eq!(self.state, BatchState::Submitting);
        self.state = BatchState::Failed;
    }
}
