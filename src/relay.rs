//! The embedding API: wires one reader task and one forwarder task per
//! partition and owns their lifecycle.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::cursor::PartitionCursor;
use crate::error::{RelayError, RelayResult};
use crate::forwarder::BatchForwarder;
use crate::sink::DeliverySink;
use crate::source::{LogSource, SourceReader};

/// Dependencies and tuning for a relay pipeline.
#[derive(Debug)]
pub struct RelayConfiguration {
    /// The log the relay reads from.
    pub source: Arc<dyn LogSource>,
    /// The delivery stream the relay writes to.
    pub sink: Arc<dyn DeliverySink>,
    /// Pipeline tuning, validated at startup.
    pub config: RelayConfig,
}

/// A running relay: one independent pipeline per partition, each owning
/// its own cursor. No state is shared across partitions.
#[derive(Debug)]
pub struct Relay {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<RelayResult<()>>>,
    cursors: DashMap<u64, Arc<PartitionCursor>>,
    failure_rx: watch::Receiver<Option<String>>,
}

/// Spawns a pipeline task that reports its failure, if any, through the
/// shared failure channel before the task exits. Only the first failure
/// is kept.
fn spawn_monitored<F>(
    future: F,
    failure: watch::Sender<Option<String>>,
) -> JoinHandle<RelayResult<()>>
where
    F: Future<Output = RelayResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = future.await;
        if let Err(err) = &result {
            failure.send_if_modified(|slot| {
                if slot.is_none() {
                    *slot = Some(err.to_string());
                    true
                } else {
                    false
                }
            });
        }
        result
    })
}

impl Relay {
    /// Validates the configuration, resumes every partition from its
    /// committed offset and spawns the per-partition pipelines.
    #[tracing::instrument(skip_all, name = "relay_start")]
    pub async fn start(configuration: RelayConfiguration) -> RelayResult<Self> {
        let RelayConfiguration {
            source,
            sink,
            config,
        } = configuration;
        config.validate()?;

        tracing::info!(
            topic = %config.source.topic,
            consumer_group = %config.source.consumer_group,
            stream = %config.sink.stream_name,
            region = %config.sink.region,
            "starting relay"
        );

        let partitions = source.partitions().await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let (failure_tx, failure_rx) = watch::channel(None);
        let cursors = DashMap::new();
        let mut handles = Vec::with_capacity(partitions.len() * 2);

        for partition in partitions {
            let reader = Arc::new(
                SourceReader::resume(source.clone(), partition, config.poll_timeout).await?,
            );
            cursors.insert(partition, reader.cursor());

            let (record_tx, record_rx) = mpsc::channel(config.queue_capacity);
            let (paused_tx, paused_rx) = watch::channel(false);

            let forwarder = BatchForwarder::new(
                reader.clone(),
                sink.clone(),
                config.batch.clone(),
                config.retry.clone(),
                config.shutdown_timeout,
                paused_tx,
            );

            handles.push(spawn_monitored(
                reader.run(
                    config.poll_max_records,
                    record_tx,
                    paused_rx,
                    shutdown_tx.subscribe(),
                    config.retry.clone(),
                ),
                failure_tx.clone(),
            ));
            handles.push(spawn_monitored(
                forwarder.run(record_rx, shutdown_tx.subscribe()),
                failure_tx.clone(),
            ));
        }

        Ok(Self {
            shutdown_tx,
            handles,
            cursors,
            failure_rx,
        })
    }

    /// The committed position (next offset to read) for a partition.
    pub fn committed_offset(&self, partition: u64) -> Option<u64> {
        self.cursors.get(&partition).map(|c| c.committed())
    }

    /// How many polled offsets await acknowledgment for a partition.
    pub fn lag(&self, partition: u64) -> Option<u64> {
        self.cursors.get(&partition).map(|c| c.lag())
    }

    /// The first pipeline failure reported so far, if any.
    ///
    /// A failed partition stops its own pipeline; the rest keep running.
    /// Callers that want to react immediately should use
    /// [`Relay::wait_for_failure`] instead of polling this.
    pub fn failure(&self) -> Option<String> {
        self.failure_rx.borrow().clone()
    }

    /// Waits until a pipeline task fails and returns its error message.
    ///
    /// Returns `None` if every pipeline ends without a failure. The
    /// relay keeps running while this waits; call [`Relay::shutdown`]
    /// afterwards to join the tasks and take the typed error.
    pub async fn wait_for_failure(&self) -> Option<String> {
        let mut rx = self.failure_rx.clone();
        loop {
            if let Some(message) = rx.borrow_and_update().clone() {
                return Some(message);
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Signals shutdown and joins every pipeline task.
    ///
    /// Readers stop polling, forwarders drain in-flight batches with a
    /// short deadline. The first pipeline failure, if any, is returned;
    /// committed-offset state is never touched by a failing partition.
    #[tracing::instrument(skip_all, name = "relay_shutdown")]
    pub async fn shutdown(self) -> RelayResult<()> {
        let _ = self.shutdown_tx.send(());

        let mut first_error: Option<RelayError> = None;
        for joined in futures::future::join_all(self.handles).await {
            let result = match joined {
                Ok(result) => result,
                Err(join_error) => Err(RelayError::from(join_error)),
            };
            if let Err(err) = result {
                tracing::error!(%err, "pipeline task failed");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
