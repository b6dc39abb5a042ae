use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use tracing_influx_sink::{
    error::BoxError,
    init::init_tracing,
    record::Point,
    TimeSeriesClient,
};

/// Example of integrating a completely custom datastore by implementing
/// the `TimeSeriesClient` trait directly. Imagine this talks to some
/// proprietary time-series DB for which this crate does not provide a
/// built-in client.
struct MyCustomTsdb;

#[async_trait]
impl TimeSeriesClient for MyCustomTsdb {
    async fn list_database_names(&self) -> Result<BTreeSet<String>, BoxError> {
        Ok(BTreeSet::from(["log".to_string()]))
    }

    async fn create_database(&self, name: &str) -> Result<(), BoxError> {
        println!("[my-custom-tsdb] create database {}", name);
        Ok(())
    }

    async fn write_points(&self, measurement: &str, points: &[Point]) -> Result<(), BoxError> {
        // Here you would call your own client library for the target DB.
        // For the sake of example we just print the batch.
        for point in points {
            println!("[my-custom-tsdb] {} {:?}", measurement, point);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let handle = init_tracing(Arc::new(MyCustomTsdb))?;

    info!("custom backend example started");
    error!(db = "my-custom-tsdb", "simulated error sent via custom backend");

    handle.ready().await?;
    handle.shutdown().await?;
    Ok(())
}
