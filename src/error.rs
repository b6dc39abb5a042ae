use std::error::Error;

/// Boxed error returned by [`TimeSeriesClient`](crate::client::TimeSeriesClient)
/// implementations.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Failure of a value or tag extractor for one record.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("metadata field `{field}` is invalid: {reason}")]
    InvalidMetadata { field: String, reason: String },

    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    pub fn custom(msg: impl Into<String>) -> Self {
        ExtractError::Custom(msg.into())
    }
}

/// Errors surfaced by the sink to log callers and to the event stream.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// Listing or creating the target database failed. The sink stays
    /// not ready for the rest of its life.
    #[error("failed to initialize database `{database}`: {source}")]
    Initialization {
        database: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to extract point from log record: {0}")]
    Extraction(#[from] ExtractError),

    /// A batched write failed; the batch has been discarded.
    #[error("failed to write {points} points to measurement `{measurement}`: {source}")]
    Flush {
        measurement: String,
        points: usize,
        #[source]
        source: BoxError,
    },

    #[error("sink is shut down")]
    Closed,
}

/// Invalid configuration values.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one host must be configured")]
    NoHosts,

    #[error("`{0}` must not be empty")]
    Empty(&'static str),

    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: String, value: String },

    #[error("flush interval must be at least {min_ms}ms")]
    FlushIntervalTooShort { min_ms: u64 },

    #[error("max buffered events must be at least 1")]
    ZeroMaxBuffered,
}
