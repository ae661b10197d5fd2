#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use streamrelay::memory::{InMemoryDeliveryStream, InMemoryLog};
    use streamrelay::{
        LogSource, Relay, RelayConfig, RelayConfiguration, SinkConfig, SourceConfig,
    };
    use tracing_test::traced_test;

    fn test_config() -> RelayConfig {
        let mut config = RelayConfig::new(
            SourceConfig {
                bootstrap_servers: vec!["broker-1:9092".into()],
                topic: "example-topic".into(),
                consumer_group: "relay-test".into(),
            },
            SinkConfig {
                stream_name: "example-stream".into(),
                region: "us-east-1".into(),
            },
        );
        config.batch.linger = Duration::from_millis(50);
        config.poll_timeout = Duration::from_millis(50);
        config.retry.base_delay = Duration::from_millis(5);
        config.retry.jitter = false;
        config.shutdown_timeout = Duration::from_secs(1);
        config
    }

    #[tokio::test]
    #[traced_test]
    async fn relays_every_record_in_order() {
        let log = Arc::new(InMemoryLog::new());
        for i in 0..20u64 {
            log.append(1, Bytes::from(format!("record-{i}")));
        }
        let stream = Arc::new(InMemoryDeliveryStream::new());

        let relay = Relay::start(RelayConfiguration {
            source: log.clone(),
            sink: stream.clone(),
            config: test_config(),
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        relay.shutdown().await.unwrap();

        let delivered = stream.records().await;
        assert_eq!(delivered.len(), 20);
        let offsets: Vec<u64> = delivered.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, (0..20).collect::<Vec<_>>());
        assert_eq!(delivered[7].data, Bytes::from_static(b"record-7"));

        // Everything acknowledged, so the resume position is past the end.
        assert_eq!(log.committed_offset(1).await.unwrap(), Some(20));
    }

    #[tokio::test]
    #[traced_test]
    async fn partitions_are_relayed_independently() {
        let log = Arc::new(InMemoryLog::new());
        for partition in 0..3u64 {
            for i in 0..5u64 {
                log.append(partition, Bytes::from(format!("p{partition}-{i}")));
            }
        }
        let stream = Arc::new(InMemoryDeliveryStream::new());

        let relay = Relay::start(RelayConfiguration {
            source: log.clone(),
            sink: stream.clone(),
            config: test_config(),
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        relay.shutdown().await.unwrap();

        let delivered = stream.records().await;
        assert_eq!(delivered.len(), 15);
        for partition in 0..3u64 {
            let offsets: Vec<u64> = delivered
                .iter()
                .filter(|r| r.partition == partition)
                .map(|r| r.offset)
                .collect();
            assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
            assert_eq!(log.committed_offset(partition).await.unwrap(), Some(5));
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn record_count_bound_produces_full_batches() {
        let log = Arc::new(InMemoryLog::new());
        for i in 0..120u64 {
            log.append(0, Bytes::from(format!("{i}")));
        }
        let stream = Arc::new(InMemoryDeliveryStream::new());

        let mut config = test_config();
        config.batch.max_records = 50;
        // Long linger so only the count bound (and the final drain) seals.
        config.batch.linger = Duration::from_secs(30);

        let relay = Relay::start(RelayConfiguration {
            source: log.clone(),
            sink: stream.clone(),
            config,
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        relay.shutdown().await.unwrap();

        let sizes = stream.batch_sizes().await;
        assert_eq!(sizes, vec![50, 50, 20]);
    }

    #[tokio::test]
    #[traced_test]
    async fn byte_bound_never_overshoots_on_a_crossing_record() {
        let log = Arc::new(InMemoryLog::new());
        for _ in 0..5 {
            log.append(0, Bytes::from(vec![0u8; 8]));
        }
        let stream = Arc::new(InMemoryDeliveryStream::new());

        let mut config = test_config();
        config.batch.max_bytes = 20;
        // Long linger so only the byte bound (and the final drain) seals.
        config.batch.linger = Duration::from_secs(30);

        let relay = Relay::start(RelayConfiguration {
            source: log.clone(),
            sink: stream.clone(),
            config,
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        relay.shutdown().await.unwrap();

        // A third 8-byte record would push a batch to 24 bytes, so it
        // opens the next batch instead.
        assert_eq!(stream.batch_sizes().await, vec![2, 2, 1]);
        for batch in stream.batches().await {
            let bytes: usize = batch.iter().map(|r| r.data.len()).sum();
            assert!(bytes <= 20, "sealed batch holds {bytes} bytes");
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn linger_seals_a_partial_batch_instead_of_waiting_forever() {
        let log = Arc::new(InMemoryLog::new());
        for i in 0..3u64 {
            log.append(0, Bytes::from(format!("{i}")));
        }
        let stream = Arc::new(InMemoryDeliveryStream::new());

        let relay = Relay::start(RelayConfiguration {
            source: log.clone(),
            sink: stream.clone(),
            config: test_config(),
        })
        .await
        .unwrap();

        // Well past the linger timeout, well before any size bound.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(stream.batch_sizes().await, vec![3]);

        relay.shutdown().await.unwrap();
    }

    #[tokio::test]
    #[traced_test]
    async fn restart_resumes_from_the_committed_offset() {
        let log = Arc::new(InMemoryLog::new());
        for i in 0..5u64 {
            log.append(0, Bytes::from(format!("first-{i}")));
        }

        let first_stream = Arc::new(InMemoryDeliveryStream::new());
        let relay = Relay::start(RelayConfiguration {
            source: log.clone(),
            sink: first_stream.clone(),
            config: test_config(),
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        relay.shutdown().await.unwrap();

        assert_eq!(first_stream.records().await.len(), 5);
        assert_eq!(log.committed_offset(0).await.unwrap(), Some(5));

        for i in 0..3u64 {
            log.append(0, Bytes::from(format!("second-{i}")));
        }

        let second_stream = Arc::new(InMemoryDeliveryStream::new());
        let relay = Relay::start(RelayConfiguration {
            source: log.clone(),
            sink: second_stream.clone(),
            config: test_config(),
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        relay.shutdown().await.unwrap();

        // Only the new records, nothing redelivered from the first run.
        let delivered = second_stream.records().await;
        assert_eq!(delivered.len(), 3);
        assert_eq!(delivered[0].offset, 5);
        assert_eq!(log.committed_offset(0).await.unwrap(), Some(8));
    }

    #[tokio::test]
    #[traced_test]
    async fn invalid_configuration_is_rejected_at_startup() {
        let mut config = test_config();
        config.sink.stream_name.clear();

        let result = Relay::start(RelayConfiguration {
            source: Arc::new(InMemoryLog::new()),
            sink: Arc::new(InMemoryDeliveryStream::new()),
            config,
        })
        .await;

        assert!(matches!(
            result,
            Err(streamrelay::RelayError::Config(_))
        ));
    }
}
