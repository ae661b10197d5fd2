//! Simple in-memory implementations of the two capability traits.
//!
//! These back the demo binary and the integration tests, and give
//! embedders a way to run the pipeline end to end without a real log
//! cluster or delivery stream behind it.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::RelayResult;
use crate::record::Record;
use crate::sink::{AppendResponse, DeliverySink};
use crate::source::LogSource;

/// A partitioned, offset-addressable log held in memory.
#[derive(Debug, Default)]
pub struct InMemoryLog {
    partitions: DashMap<u64, Vec<Bytes>>,
    committed: DashMap<u64, u64>,
    commit_calls: AtomicU64,
}

impl InMemoryLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a payload to `partition`, returning its assigned offset.
    pub fn append(&self, partition: u64, data: Bytes) -> u64 {
        let mut records = self.partitions.entry(partition).or_default();
        records.push(data);
        (records.len() - 1) as u64
    }

    /// How many times `commit_offset` has been called, across partitions.
    pub fn commit_calls(&self) -> u64 {
        self.commit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LogSource for InMemoryLog {
    async fn partitions(&self) -> RelayResult<Vec<u64>> {
        let mut partitions: Vec<u64> = self.partitions.iter().map(|e| *e.key()).collect();
        partitions.sort_unstable();
        Ok(partitions)
    }

    async fn fetch(
        &self,
        partition: u64,
        offset: u64,
        max_records: usize,
    ) -> RelayResult<Vec<Record>> {
        let Some(records) = self.partitions.get(&partition) else {
            return Ok(Vec::new());
        };
        let start = offset as usize;
        if start >= records.len() {
            return Ok(Vec::new());
        }
        Ok(records[start..]
            .iter()
            .take(max_records)
            .enumerate()
            .map(|(i, data)| Record::new(partition, offset + i as u64, data.clone()))
            .collect())
    }

    async fn commit_offset(&self, partition: u64, next_offset: u64) -> RelayResult<()> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        self.committed
            .entry(partition)
            .and_modify(|current| *current = (*current).max(next_offset))
            .or_insert(next_offset);
        Ok(())
    }

    async fn committed_offset(&self, partition: u64) -> RelayResult<Option<u64>> {
        Ok(self.committed.get(&partition).map(|v| *v))
    }
}

/// An append-only delivery stream held in memory. Accepts every batch.
#[derive(Debug, Default)]
pub struct InMemoryDeliveryStream {
    batches: Mutex<Vec<Vec<Record>>>,
}

impl InMemoryDeliveryStream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many batches have been appended.
    pub async fn batch_count(&self) -> usize {
        self.batches.lock().await.len()
    }

    /// Every delivered record, in append order.
    pub async fn records(&self) -> Vec<Record> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }

    /// The record count of each appended batch, in append order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().await.iter().map(Vec::len).collect()
    }

    /// Every appended batch, in append order.
    pub async fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl DeliverySink for InMemoryDeliveryStream {
    async fn append(&self, records: &[Record]) -> RelayResult<AppendResponse> {
        self.batches.lock().await.push(records.to_vec());
        Ok(AppendResponse::ack())
    }
}
