//! Per-partition read-position tracking.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RelayError, RelayResult};

/// Tracks the read position of a single partition.
///
/// Offsets are stored in next-offset convention: `committed` is the first
/// offset that has not been durably acknowledged by the sink, `in_flight`
/// is the first offset that has not yet been handed to the forwarder.
/// The invariant `committed <= in_flight` always holds; everything in
/// between is subject to redelivery after a restart (at-least-once).
///
/// Shared between the reader task (which advances `in_flight`) and the
/// forwarder task (which advances `committed`), so both fields are atomic.
#[derive(Debug)]
pub struct PartitionCursor {
    partition: u64,
    committed: AtomicU64,
    in_flight: AtomicU64,
}

impl PartitionCursor {
    /// Creates a cursor resuming from `start`, the next offset to read.
    pub fn new(partition: u64, start: u64) -> Self {
        Self {
            partition,
            committed: AtomicU64::new(start),
            in_flight: AtomicU64::new(start),
        }
    }

    /// The partition this cursor belongs to.
    pub fn partition(&self) -> u64 {
        self.partition
    }

    /// The next offset that has not been acknowledged by the sink.
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    /// The next offset that has not been handed to the forwarder.
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Records that offsets up to (excluding) `next` have been polled.
    pub fn advance_in_flight(&self, next: u64) {
        self.in_flight.fetch_max(next, Ordering::SeqCst);
    }

    /// Marks the record at `offset` as acknowledged, advancing the
    /// committed position to `offset + 1`.
    ///
    /// Returns the new committed position, or [`RelayError::InvalidOffset`]
    /// if a concurrent commit already advanced past it. Stale commits are
    /// benign; callers log them and carry on.
    pub fn commit(&self, offset: u64) -> RelayResult<u64> {
        let next = offset + 1;
        let prev = self.committed.fetch_max(next, Ordering::SeqCst);
        if next <= prev {
            return Err(RelayError::InvalidOffset {
                partition: self.partition,
                offset,
                committed: prev,
            });
        }
        Ok(next)
    }

    /// How many polled offsets are still awaiting acknowledgment.
    pub fn lag(&self) -> u64 {
        self.in_flight().saturating_sub(self.committed())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn commit_advances_the_committed_position() {
        let cursor = PartitionCursor::new(3, 0);
        cursor.advance_in_flight(5);

        assert_eq!(cursor.commit(2).unwrap(), 3);
        assert_eq!(cursor.committed(), 3);
        assert_eq!(cursor.lag(), 2);
    }

    #[test]
    fn stale_commit_is_reported_without_moving_the_cursor() {
        let cursor = PartitionCursor::new(0, 0);
        cursor.advance_in_flight(10);
        cursor.commit(7).unwrap();

        let err = cursor.commit(4).unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidOffset {
                offset: 4,
                committed: 8,
                ..
            }
        ));
        assert_eq!(cursor.committed(), 8);
    }

    #[test]
    fn committed_never_exceeds_in_flight_under_normal_flow() {
        let cursor = PartitionCursor::new(1, 100);
        assert_eq!(cursor.committed(), 100);
        assert_eq!(cursor.in_flight(), 100);

        cursor.advance_in_flight(110);
        cursor.commit(104).unwrap();
        assert!(cursor.committed() <= cursor.in_flight());
    }
}
