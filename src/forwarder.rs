//! Accumulates records into bounded batches and drives them through the
//! sink, committing offsets once the sink acknowledges.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};

use crate::batch::{Batch, SealReason};
use crate::config::{BatchConfig, RetryConfig};
use crate::error::{RelayError, RelayResult};
use crate::record::Record;
use crate::sink::DeliverySink;
use crate::source::SourceReader;

/// Result of driving one sealed batch through the sink.
#[derive(Debug)]
enum Submission {
    /// The sink settled the batch: fully acknowledged, or partially
    /// rejected with the listed records to requeue.
    Settled(Vec<Record>),
    /// Shutdown arrived mid-retry. The batch stays unacknowledged and
    /// its offsets replay on the next run.
    Aborted,
}

/// Consumes one partition's record queue, batches it and submits batches
/// to the delivery sink with bounded retry.
///
/// Commits flow back through the shared [`SourceReader`]: only after the
/// sink durably accepts a record is its offset committed, so the committed
/// position never runs ahead of an acknowledged record.
#[derive(Debug)]
pub struct BatchForwarder {
    reader: Arc<SourceReader>,
    sink: Arc<dyn DeliverySink>,
    batch_cfg: BatchConfig,
    retry: RetryConfig,
    shutdown_timeout: Duration,
    paused: watch::Sender<bool>,
}

impl BatchForwarder {
    /// Creates a forwarder for the reader's partition.
    pub fn new(
        reader: Arc<SourceReader>,
        sink: Arc<dyn DeliverySink>,
        batch_cfg: BatchConfig,
        retry: RetryConfig,
        shutdown_timeout: Duration,
        paused: watch::Sender<bool>,
    ) -> Self {
        Self {
            reader,
            sink,
            batch_cfg,
            retry,
            shutdown_timeout,
            paused,
        }
    }

    /// Runs the batching loop until the record queue closes or shutdown
    /// is signalled, then drains best-effort: one final submission with a
    /// short deadline, leaving uncommitted offsets to be replayed on the
    /// next run.
    #[tracing::instrument(skip_all, fields(partition = self.reader.partition()))]
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<Record>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> RelayResult<()> {
        let mut requeued: Vec<Record> = Vec::new();
        let mut carry: Option<Record> = None;
        let mut retry_round: u32 = 0;

        loop {
            let mut batch = Batch::seeded(std::mem::take(&mut requeued));
            if let Some(record) = carry.take() {
                if batch.fits(&record, &self.batch_cfg) {
                    batch.push(record);
                } else {
                    // Still does not fit next to the requeued records;
                    // hold it for the batch after this one.
                    carry = Some(record);
                }
            }

            let draining = self.accumulate(&mut batch, &mut rx, &mut carry).await;

            if batch.is_empty() {
                if draining {
                    return Ok(());
                }
                continue;
            }

            if draining {
                // Final best-effort submission; failures here are replayed
                // from the committed offset on the next run.
                if let Err(err) = self.submit(&mut batch, true, &mut shutdown).await {
                    tracing::warn!(
                        partition = self.reader.partition(),
                        %err,
                        "final drain submission failed, offsets will replay"
                    );
                }
                return Ok(());
            }

            if retry_round > 0 {
                let delay = self.retry.delay_for(retry_round);
                tracing::debug!(
                    partition = self.reader.partition(),
                    retry_round,
                    ?delay,
                    "backing off before resubmitting rejected records"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.recv() => {
                        if let Err(err) = self.submit(&mut batch, true, &mut shutdown).await {
                            tracing::warn!(
                                partition = self.reader.partition(),
                                %err,
                                "final drain submission failed, offsets will replay"
                            );
                        }
                        return Ok(());
                    }
                }
            }

            match self.submit(&mut batch, false, &mut shutdown).await? {
                Submission::Aborted => return Ok(()),
                Submission::Settled(rejected) => requeued = rejected,
            }

            if requeued.is_empty() {
                retry_round = 0;
                self.paused.send_replace(false);
            } else {
                retry_round += 1;
                if retry_round >= self.retry.max_attempts {
                    return Err(RelayError::RetriesExhausted {
                        attempts: retry_round,
                        last_error: format!(
                            "{} records still rejected by the sink",
                            requeued.len()
                        ),
                    });
                }
                // Pause polling while the rejection backlog works off.
                self.paused.send_replace(true);
            }
        }
    }

    /// Fills `batch` until a size bound or the linger timeout seals it.
    ///
    /// A record whose payload would push the batch past the byte bound
    /// seals the batch first and is parked in `carry` for the next one,
    /// so sealed batches never exceed `max_bytes` (unless a single record
    /// does on its own). Returns `true` when the record queue has closed
    /// and the pipeline is draining.
    async fn accumulate(
        &self,
        batch: &mut Batch,
        rx: &mut mpsc::Receiver<Record>,
        carry: &mut Option<Record>,
    ) -> bool {
        loop {
            if let Some(reason) = batch.size_bound_hit(&self.batch_cfg) {
                batch.seal(reason);
                return false;
            }

            let Some(opened_at) = batch.opened_at() else {
                // Nothing buffered yet, wait without a linger deadline.
                match rx.recv().await {
                    Some(record) => batch.push(record),
                    None => return true,
                }
                continue;
            };

            let deadline = tokio::time::Instant::from_std(opened_at + self.batch_cfg.linger);
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(record)) => {
                    if batch.fits(&record, &self.batch_cfg) {
                        batch.push(record);
                    } else {
                        *carry = Some(record);
                        batch.seal(SealReason::ByteSize);
                        return false;
                    }
                }
                Ok(None) => {
                    batch.seal(SealReason::Drain);
                    return true;
                }
                Err(_elapsed) => {
                    batch.seal(SealReason::Linger);
                    return false;
                }
            }
        }
    }

    /// Submits a sealed batch, retrying transient failures with backoff.
    ///
    /// On full acknowledgment the highest offset in the batch is committed.
    /// On partial rejection the accepted records' offsets are committed and
    /// the rejected records are returned for requeueing. Exhausting the
    /// attempt budget, or any permanent sink failure, is fatal for the
    /// partition: silently dropping the batch would break at-least-once
    /// delivery. Shutdown during a retry backoff abandons the batch
    /// instead, leaving its offsets to replay.
    async fn submit(
        &self,
        batch: &mut Batch,
        draining: bool,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> RelayResult<Submission> {
        let max_attempts = if draining { 1 } else { self.retry.max_attempts };
        let attempt_timeout = if draining {
            self.shutdown_timeout
        } else {
            self.retry.attempt_timeout
        };
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            batch.begin_submission();

            let outcome =
                match tokio::time::timeout(attempt_timeout, self.sink.append(batch.records()))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_elapsed) => Err(RelayError::TransientSink(format!(
                        "append attempt timed out after {attempt_timeout:?}"
                    ))),
                };

            match outcome {
                Ok(response) if response.is_fully_acked() => {
                    batch.mark_acked();
                    if let Some(highest) = batch.highest_offset() {
                        self.reader.commit(highest).await?;
                    }
                    tracing::info!(
                        batch_id = %batch.id(),
                        records = batch.len(),
                        bytes = batch.byte_size(),
                        attempt,
                        "batch acknowledged"
                    );
                    return Ok(Submission::Settled(Vec::new()));
                }
                Ok(response) => {
                    batch.mark_partially_rejected();
                    let rejected: HashSet<usize> =
                        response.rejected.iter().map(|r| r.index).collect();

                    let mut requeue = Vec::with_capacity(rejected.len());
                    for (index, record) in batch.records().iter().enumerate() {
                        if rejected.contains(&index) {
                            requeue.push(record.clone());
                        } else {
                            self.reader.commit(record.offset).await?;
                        }
                    }
                    tracing::warn!(
                        batch_id = %batch.id(),
                        accepted = batch.len() - requeue.len(),
                        rejected = requeue.len(),
                        "batch partially rejected, requeueing"
                    );
                    return Ok(Submission::Settled(requeue));
                }
                Err(err) if err.is_retryable() => {
                    batch.mark_failed();
                    last_error = err.to_string();
                    if attempt < max_attempts {
                        let delay = self.retry.delay_for(attempt);
                        tracing::warn!(
                            batch_id = %batch.id(),
                            attempt,
                            %err,
                            ?delay,
                            "transient sink failure, retrying"
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown.recv() => {
                                tracing::debug!(
                                    batch_id = %batch.id(),
                                    attempt,
                                    "shutdown during retry backoff, abandoning batch"
                                );
                                return Ok(Submission::Aborted);
                            }
                        }
                    }
                }
                Err(err) => {
                    batch.mark_failed();
                    tracing::error!(batch_id = %batch.id(), %err, "permanent sink failure");
                    return Err(err);
                }
            }
        }

        Err(RelayError::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
