//! Buffered, batched forwarding of log events to InfluxDB.
//!
//! Log calls are handed to a background worker that first makes sure the
//! target database exists, queueing calls until it does. Accepted records
//! are turned into points by two replaceable extractors and buffered; the
//! buffer is written in one batch when it reaches `max_buffered_events` or
//! when the flush timer fires, whichever comes first.

mod batcher;
pub mod client;
pub mod config;
pub mod env;
pub mod error;
pub mod events;
pub mod extract;
pub mod flush;
mod gate;
pub mod init;
pub mod layer;
pub mod line_protocol;
pub mod memory;
mod pending;
pub mod record;
pub mod sink;

#[cfg(feature = "influxdb")]
pub mod influxdb;

pub use client::TimeSeriesClient;
pub use config::{Credentials, HostConfig, Protocol, SinkConfig};
pub use error::{ConfigError, ExtractError, SinkError};
pub use events::{FlushTrigger, SinkEvent, StatsSnapshot};
pub use extract::{BuildTags, BuildValues};
pub use record::{LogRecord, Point, TagSet, ValueSet};
pub use sink::{InfluxSink, InfluxSinkBuilder, LogAck, SinkHandle};
