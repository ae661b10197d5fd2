//! The log side of the pipeline: the source capability and the reader
//! that drives it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use crate::config::RetryConfig;
use crate::cursor::PartitionCursor;
use crate::error::{RelayError, RelayResult};
use crate::record::Record;

/// How long an empty fetch waits before the reader tries again.
const FETCH_IDLE_WAIT: Duration = Duration::from_millis(10);

/// Capability handle for a partitioned, offset-addressable log.
///
/// Offsets use next-offset convention throughout: `commit_offset` records
/// the next offset to read, and `committed_offset` returns it, so a
/// restarted reader resumes exactly where the last acknowledged record
/// left off. Records between the committed and the in-flight position are
/// redelivered after a restart (at-least-once).
#[async_trait::async_trait]
pub trait LogSource
where
    Self: Send + Sync + std::fmt::Debug,
{
    /// The partitions of the configured topic.
    async fn partitions(&self) -> RelayResult<Vec<u64>>;

    /// Fetches up to `max_records` records from `partition` starting at
    /// `offset`, in offset order. Returns an empty vector when no data is
    /// available yet.
    async fn fetch(
        &self,
        partition: u64,
        offset: u64,
        max_records: usize,
    ) -> RelayResult<Vec<Record>>;

    /// Durably records `next_offset` as the resume position for `partition`.
    async fn commit_offset(&self, partition: u64, next_offset: u64) -> RelayResult<()>;

    /// The last committed resume position for `partition`, if any.
    async fn committed_offset(&self, partition: u64) -> RelayResult<Option<u64>>;
}

/// Pulls records from one partition of a [`LogSource`], tracking the read
/// position in a shared [`PartitionCursor`].
///
/// The reader is shared between the polling task and the forwarder: `poll`
/// advances the in-flight position, `commit` advances the committed one.
/// Both sides go through the same cursor, so the
/// `committed <= in_flight` invariant holds at every step.
#[derive(Debug)]
pub struct SourceReader {
    source: Arc<dyn LogSource>,
    cursor: Arc<PartitionCursor>,
    poll_timeout: Duration,
}

impl SourceReader {
    /// Creates a reader for `partition`, resuming from the source's last
    /// committed offset (or the beginning of the partition if none).
    pub async fn resume(
        source: Arc<dyn LogSource>,
        partition: u64,
        poll_timeout: Duration,
    ) -> RelayResult<Self> {
        let start = source.committed_offset(partition).await?.unwrap_or(0);
        tracing::debug!(partition, start, "resuming reader");
        Ok(Self {
            source,
            cursor: Arc::new(PartitionCursor::new(partition, start)),
            poll_timeout,
        })
    }

    /// The cursor shared with the forwarder.
    pub fn cursor(&self) -> Arc<PartitionCursor> {
        self.cursor.clone()
    }

    /// The partition this reader owns.
    pub fn partition(&self) -> u64 {
        self.cursor.partition()
    }

    /// Returns between 0 and `max_records` records, advancing the
    /// in-flight position past everything returned.
    ///
    /// Suspends cooperatively while no data is available, up to the
    /// configured poll timeout, then returns an empty vector rather than
    /// failing.
    pub async fn poll(&self, max_records: usize) -> RelayResult<Vec<Record>> {
        let deadline = Instant::now() + self.poll_timeout;
        loop {
            let offset = self.cursor.in_flight();
            let records = self
                .source
                .fetch(self.partition(), offset, max_records)
                .await?;

            if let Some(last) = records.last() {
                self.cursor.advance_in_flight(last.offset + 1);
                return Ok(records);
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            tokio::time::sleep(FETCH_IDLE_WAIT).await;
        }
    }

    /// Marks the record at `offset` as acknowledged and pushes the new
    /// resume position to the source.
    ///
    /// A stale offset indicates a benign race between concurrent commits;
    /// it is logged and swallowed rather than surfaced.
    pub async fn commit(&self, offset: u64) -> RelayResult<()> {
        match self.cursor.commit(offset) {
            Ok(next) => self.source.commit_offset(self.partition(), next).await,
            Err(RelayError::InvalidOffset {
                partition,
                offset,
                committed,
            }) => {
                tracing::warn!(partition, offset, committed, "ignoring stale commit");
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    /// Runs the polling loop, feeding records into the bounded pipeline
    /// queue until shutdown.
    ///
    /// Respects the forwarder's pause signal, and retries indefinitely
    /// with backoff when the source reports itself unavailable: the
    /// partition must eventually resume from its committed offset.
    #[tracing::instrument(skip_all, fields(partition = self.partition()))]
    pub async fn run(
        self: Arc<Self>,
        max_records: usize,
        tx: mpsc::Sender<Record>,
        mut paused: watch::Receiver<bool>,
        mut shutdown: broadcast::Receiver<()>,
        retry: RetryConfig,
    ) -> RelayResult<()> {
        let mut unavailable_streak: u32 = 0;
        loop {
            while *paused.borrow() {
                tokio::select! {
                    changed = paused.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                    }
                    _ = shutdown.recv() => return Ok(()),
                }
            }

            let polled = tokio::select! {
                polled = self.poll(max_records) => polled,
                _ = shutdown.recv() => return Ok(()),
            };

            match polled {
                Ok(records) => {
                    unavailable_streak = 0;
                    for record in records {
                        if tx.send(record).await.is_err() {
                            // Forwarder is gone; nothing left to feed.
                            return Ok(());
                        }
                    }
                }
                Err(RelayError::SourceUnavailable(reason)) => {
                    unavailable_streak = unavailable_streak.saturating_add(1);
                    let delay = retry.delay_for(unavailable_streak);
                    tracing::warn!(
                        partition = self.partition(),
                        %reason,
                        streak = unavailable_streak,
                        ?delay,
                        "source unavailable, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.recv() => return Ok(()),
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }
}
