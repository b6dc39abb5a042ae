use std::sync::Arc;

use serde_json::json;
use tracing_influx_sink::config::SinkConfig;
use tracing_influx_sink::influxdb::InfluxClient;
use tracing_influx_sink::{ExtractError, InfluxSink, LogRecord, SinkEvent, TagSet};

/// Writes a few records into a local InfluxDB 1.x.
///
/// Point it elsewhere with `INFLUX_SINK_HOSTS`, `INFLUX_SINK_DATABASE`,
/// `INFLUX_SINK_USERNAME` / `INFLUX_SINK_PASSWORD`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SinkConfig::from_env()?;
    let client = Arc::new(InfluxClient::new(&config));

    // Tag every point with its level on top of the tags from metadata.
    let sink = InfluxSink::builder(client)
        .config(config)
        .build_tags(|record: &LogRecord| -> Result<TagSet, ExtractError> {
            let mut tags = TagSet::new();
            if let Some(serde_json::Value::Object(map)) = record.metadata.get("tags") {
                for (k, v) in map {
                    tags.insert(k.clone(), v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()));
                }
            }
            tags.insert("level".to_string(), record.level.clone());
            Ok(tags)
        })
        .spawn()?;

    let mut events = sink.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let SinkEvent::Error(e) = event {
                eprintln!("influx sink error: {}", e);
            }
        }
    });

    // Issued before the database is confirmed; queued and replayed.
    let first = sink.log("info", "service started", json!({ "values": { "message": "service started" } }));

    sink.log(
        "error",
        "order failed",
        json!({
            "values": { "message": "order failed", "order_id": 123, "amount": 9.99 },
            "tags": { "service": "checkout" }
        }),
    )
    .await?;
    first.await?;

    sink.shutdown().await?;
    Ok(())
}
