//! streamrelay
//!
//! A bounded, at-least-once, backpressure-aware relay between a pull-based
//! partitioned log and a batch-oriented delivery stream.
//!
//! Each partition gets its own pipeline: a [`source::SourceReader`] polls
//! records and tracks the read position, a [`forwarder::BatchForwarder`]
//! accumulates them into size/time-bounded batches and submits each batch
//! as one sink call, committing offsets only after the sink acknowledges.
//! The log and the stream sit behind the [`source::LogSource`] and
//! [`sink::DeliverySink`] capability traits; in-memory implementations of
//! both ship in [`memory`].
//!
//! example usage:
//!
//! ```no_run
//! # async fn example() -> streamrelay::RelayResult<()> {
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use streamrelay::memory::{InMemoryDeliveryStream, InMemoryLog};
//! use streamrelay::{Relay, RelayConfig, RelayConfiguration, SinkConfig, SourceConfig};
//!
//! let log = Arc::new(InMemoryLog::new());
//! log.append(0, Bytes::from_static(b"hello"));
//!
//! let stream = Arc::new(InMemoryDeliveryStream::new());
//!
//! let relay = Relay::start(RelayConfiguration {
//!     source: log.clone(),
//!     sink: stream.clone(),
//!     config: RelayConfig::new(
//!         SourceConfig {
//!             bootstrap_servers: vec!["broker-1:9092".into()],
//!             topic: "example-topic".into(),
//!             consumer_group: "relay".into(),
//!         },
//!         SinkConfig {
//!             stream_name: "example-stream".into(),
//!             region: "us-east-1".into(),
//!         },
//!     ),
//! })
//! .await?;
//!
//! relay.shutdown().await?;
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::unwrap_used)]

pub mod batch;
pub mod config;
pub mod cursor;
pub mod error;
pub mod forwarder;
pub mod memory;
pub mod record;
pub mod relay;
pub mod sink;
pub mod source;

pub use config::{BatchConfig, RelayConfig, RetryConfig, SinkConfig, SourceConfig};
pub use error::{RelayError, RelayResult};
pub use record::Record;
pub use relay::{Relay, RelayConfiguration};
pub use sink::{AppendResponse, DeliverySink, RejectedRecord};
pub use source::{LogSource, SourceReader};
