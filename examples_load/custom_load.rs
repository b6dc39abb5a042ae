use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::error;

use tracing_influx_sink::config::SinkConfig;
use tracing_influx_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_influx_sink::memory::MemoryClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = MemoryClient::new();

    let layer_config = LayerConfig {
        sink: SinkConfig {
            level: "error".to_string(),
            max_buffered_events: 1_000,
            flush_interval: Duration::from_millis(200),
            ..SinkConfig::default()
        },
        enable_stdout: false,
    };

    let handle = init_tracing_with_config(Arc::new(client.clone()), layer_config)?;
    handle.ready().await?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    handle.shutdown().await?;
    let stats = handle.stats();
    println!("accepted {} records, {} flushes", stats.accepted, stats.flushes);
    Ok(())
}
