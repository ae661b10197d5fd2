//! Demo: relays a handful of records from an in-memory log to an
//! in-memory delivery stream and reports what arrived.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use streamrelay::memory::{InMemoryDeliveryStream, InMemoryLog};
use streamrelay::{Relay, RelayConfig, RelayConfiguration, SinkConfig, SourceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let log = Arc::new(InMemoryLog::new());
    for partition in 0..2u64 {
        for i in 0..10u64 {
            log.append(partition, Bytes::from(format!("record-{partition}-{i}")));
        }
    }

    let stream = Arc::new(InMemoryDeliveryStream::new());

    let mut config = RelayConfig::new(
        SourceConfig {
            bootstrap_servers: vec!["broker-1:9092".into()],
            topic: "example-topic".into(),
            consumer_group: "streamrelay-demo".into(),
        },
        SinkConfig {
            stream_name: "example-stream".into(),
            region: "us-east-1".into(),
        },
    );
    config.batch.linger = Duration::from_millis(100);

    let relay = Relay::start(RelayConfiguration {
        source: log.clone(),
        sink: stream.clone(),
        config,
    })
    .await?;

    tokio::time::sleep(Duration::from_millis(500)).await;
    relay.shutdown().await?;

    tracing::info!(
        delivered = stream.records().await.len(),
        batches = stream.batch_count().await,
        commits = log.commit_calls(),
        "relay finished"
    );

    Ok(())
}
