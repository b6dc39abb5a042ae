use crate::error::BoxError;
use crate::record::Point;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Asynchronous time-series datastore the sink writes into.
///
/// Implementations transport points to a concrete backend (InfluxDB over
/// HTTP, an in-memory store for tests, etc). The sink only ever calls these
/// from its background tasks, never from the thread issuing log calls.
#[async_trait]
pub trait TimeSeriesClient: Send + Sync {
    /// Names of all databases that currently exist.
    async fn list_database_names(&self) -> Result<BTreeSet<String>, BoxError>;

    /// Create the database `name`.
    async fn create_database(&self, name: &str) -> Result<(), BoxError>;

    /// Write a batch of points into `measurement`.
    ///
    /// **Returns**
    /// - `Ok(())` if the backend accepted the whole batch. An empty batch
    ///   must succeed.
    /// - `Err(..)` on any failure. The sink does not retry: the batch is
    ///   reported and dropped.
    async fn write_points(&self, measurement: &str, points: &[Point]) -> Result<(), BoxError>;
}
