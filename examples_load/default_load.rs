use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_influx_sink::init::init_tracing;
use tracing_influx_sink::memory::MemoryClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = MemoryClient::new();
    let handle = init_tracing(Arc::new(client.clone()))?;
    handle.ready().await?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!("default config: sent {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    // Drain the worker and flush the tail of the buffer.
    handle.shutdown().await?;
    println!("written: {} points in {} batches", client.points().len(), client.batches().len());
    Ok(())
}
