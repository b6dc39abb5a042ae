use crate::client::TimeSeriesClient;
use crate::error::SinkError;
use crate::events::{FlushTrigger, SinkEvent, SinkStats};
use crate::record::Point;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

/// Write one batch into `measurement`.
///
/// A failed batch is not retried; the caller decides how to report it.
pub async fn write_batch(
    client: &dyn TimeSeriesClient,
    measurement: &str,
    points: &[Point],
) -> Result<(), SinkError> {
    client
        .write_points(measurement, points)
        .await
        .map_err(|source| SinkError::Flush {
            measurement: measurement.to_string(),
            points: points.len(),
            source,
        })
}

/// Runs batched writes on background tasks so a slow datastore never holds
/// up the worker that accepts new records.
pub(crate) struct FlushExecutor {
    name: Arc<str>,
    client: Arc<dyn TimeSeriesClient>,
    measurement: Arc<str>,
    events: broadcast::Sender<SinkEvent>,
    stats: Arc<SinkStats>,
    in_flight: JoinSet<()>,
}

impl FlushExecutor {
    pub fn new(
        name: Arc<str>,
        client: Arc<dyn TimeSeriesClient>,
        measurement: Arc<str>,
        events: broadcast::Sender<SinkEvent>,
        stats: Arc<SinkStats>,
    ) -> Self {
        Self {
            name,
            client,
            measurement,
            events,
            stats,
            in_flight: JoinSet::new(),
        }
    }

    /// Start writing `points`. Failures are reported on the event stream and
    /// the batch is dropped.
    pub fn spawn(&mut self, points: Vec<Point>, trigger: FlushTrigger) {
        let name = Arc::clone(&self.name);
        let client = Arc::clone(&self.client);
        let measurement = Arc::clone(&self.measurement);
        let events = self.events.clone();
        let stats = Arc::clone(&self.stats);

        self.in_flight.spawn(async move {
            let count = points.len();
            match write_batch(&*client, &measurement, &points).await {
                Ok(()) => {
                    stats.record_flush(count);
                    debug!(sink = %name, points = count, trigger = %trigger, "flushed batch");
                    let _ = events.send(SinkEvent::Flushed { points: count, trigger });
                }
                Err(e) => {
                    stats.record_flush_failure();
                    error!(sink = %name, points = count, trigger = %trigger, error = %e, "dropping batch after failed write");
                    let _ = events.send(SinkEvent::Error(Arc::new(e)));
                }
            }
        });
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Wait for the next in-flight write to finish.
    pub async fn join_next(&mut self) -> Option<Result<(), JoinError>> {
        self.in_flight.join_next().await
    }

    pub fn reap(&self, result: Result<(), JoinError>) {
        if let Err(e) = result {
            error!(sink = %self.name, error = %e, "flush task failed");
        }
    }

    /// Wait for every in-flight write.
    pub async fn drain(&mut self) {
        while let Some(result) = self.in_flight.join_next().await {
            self.reap(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClient;
    use crate::record::{TagSet, ValueSet};
    use chrono::Utc;

    fn points(n: usize) -> Vec<Point> {
        (0..n)
            .map(|_| Point::stamped(ValueSet::new(), TagSet::new(), Utc::now()))
            .collect()
    }

    fn executor(client: &MemoryClient) -> (FlushExecutor, broadcast::Receiver<SinkEvent>, Arc<SinkStats>) {
        let (tx, rx) = broadcast::channel(16);
        let stats = Arc::new(SinkStats::default());
        let exec = FlushExecutor::new(
            "test".into(),
            Arc::new(client.clone()),
            "log".into(),
            tx,
            Arc::clone(&stats),
        );
        (exec, rx, stats)
    }

    #[tokio::test]
    async fn write_batch_wraps_client_errors() {
        let client = MemoryClient::new();
        client.fail_next_writes(1);
        let err = write_batch(&client, "log", &points(2)).await.unwrap_err();
        assert!(matches!(err, SinkError::Flush { points: 2, ref measurement, .. } if measurement == "log"));
    }

    #[tokio::test]
    async fn successful_flush_reports_points() {
        let client = MemoryClient::new();
        let (mut exec, mut rx, stats) = executor(&client);

        exec.spawn(points(3), FlushTrigger::Size);
        exec.drain().await;

        assert_eq!(client.batches().len(), 1);
        assert_eq!(client.batches()[0].measurement, "log");
        assert!(matches!(
            rx.recv().await.unwrap(),
            SinkEvent::Flushed { points: 3, trigger: FlushTrigger::Size }
        ));
        assert_eq!(stats.snapshot().flushed_points, 3);
    }

    #[tokio::test]
    async fn empty_flush_is_not_an_error() {
        let client = MemoryClient::new();
        let (mut exec, mut rx, stats) = executor(&client);

        exec.spawn(Vec::new(), FlushTrigger::Timer);
        exec.drain().await;

        assert!(matches!(rx.recv().await.unwrap(), SinkEvent::Flushed { points: 0, .. }));
        assert_eq!(stats.snapshot().flush_failures, 0);
    }

    #[tokio::test]
    async fn failed_flush_drops_the_batch() {
        let client = MemoryClient::new();
        client.fail_next_writes(1);
        let (mut exec, mut rx, stats) = executor(&client);

        exec.spawn(points(2), FlushTrigger::Timer);
        exec.drain().await;
        exec.spawn(points(1), FlushTrigger::Timer);
        exec.drain().await;

        assert!(matches!(rx.recv().await.unwrap(), SinkEvent::Error(_)));
        assert!(matches!(rx.recv().await.unwrap(), SinkEvent::Flushed { points: 1, .. }));
        // The failed batch was not retried.
        assert_eq!(client.points().len(), 1);
        assert_eq!(stats.snapshot().flush_failures, 1);
    }
}
