use crate::batcher::Batcher;
use crate::client::TimeSeriesClient;
use crate::config::SinkConfig;
use crate::error::{ConfigError, SinkError};
use crate::events::{FlushTrigger, SinkEvent, SinkStats, StatsSnapshot};
use crate::extract::{BuildTags, BuildValues, MetadataTags, MetadataValues};
use crate::flush::FlushExecutor;
use crate::gate::{initialize, Gate, InitOutcome};
use crate::pending::LogCall;
use crate::record::{LogRecord, Point};
use chrono::Utc;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 1024;

enum Command {
    Log(LogCall),
    Shutdown(oneshot::Sender<()>),
}

/// Outcome of a single log call.
///
/// Resolves to `Ok(())` once the record has been buffered (or acknowledged
/// in silent mode), not once it is written. Calls made before the sink is
/// ready resolve after the queued call has been replayed.
pub struct LogAck {
    rx: oneshot::Receiver<Result<(), SinkError>>,
}

impl Future for LogAck {
    type Output = Result<(), SinkError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(SinkError::Closed)))
    }
}

/// Cloneable handle for issuing log calls to a running sink.
#[derive(Clone)]
pub struct SinkHandle {
    tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SinkEvent>,
    ready: watch::Receiver<bool>,
    stats: Arc<SinkStats>,
}

impl SinkHandle {
    /// Submit a log call. Never blocks: the record is processed by the sink
    /// worker, or queued there until the database is ready.
    pub fn log(&self, level: impl Into<String>, message: impl Into<String>, metadata: Value) -> LogAck {
        let (reply, rx) = oneshot::channel();
        let call = LogCall {
            record: LogRecord::new(level, message, metadata),
            reply: Some(reply),
        };
        // If the worker is gone the reply sender is dropped with the call
        // and the ack resolves to `Closed`.
        let _ = self.tx.send(Command::Log(call));
        LogAck { rx }
    }

    /// Submit a log call without waiting for its outcome. Returns `false`
    /// if the sink has shut down.
    pub fn log_detached(&self, record: LogRecord) -> bool {
        self.tx
            .send(Command::Log(LogCall { record, reply: None }))
            .is_ok()
    }

    /// Subscribe to sink events. Only events emitted after this call are
    /// received.
    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.events.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the target database is confirmed and queued calls have
    /// been replayed.
    pub async fn ready(&self) -> Result<(), SinkError> {
        let mut ready = self.ready.clone();
        ready
            .wait_for(|r| *r)
            .await
            .map(|_| ())
            .map_err(|_| SinkError::Closed)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the worker: buffered points are flushed, in-flight writes are
    /// awaited, and calls still waiting for readiness fail with
    /// [`SinkError::Closed`].
    pub async fn shutdown(&self) -> Result<(), SinkError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown(tx))
            .map_err(|_| SinkError::Closed)?;
        rx.await.map_err(|_| SinkError::Closed)
    }
}

/// Buffering sink in front of a [`TimeSeriesClient`].
///
/// Owns the background worker: dropping the sink aborts it, cancelling the
/// flush timer. Call [`InfluxSink::shutdown`] to flush what is buffered
/// first.
pub struct InfluxSink {
    handle: SinkHandle,
    worker: JoinHandle<()>,
}

impl InfluxSink {
    /// Start a sink with the default extractors.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(client: Arc<dyn TimeSeriesClient>, config: SinkConfig) -> Result<Self, ConfigError> {
        Self::builder(client).config(config).spawn()
    }

    /// Start a sink talking to InfluxDB over HTTP.
    #[cfg(feature = "influxdb")]
    pub fn connect(config: SinkConfig) -> Result<Self, ConfigError> {
        let client = crate::influxdb::InfluxClient::new(&config);
        Self::new(Arc::new(client), config)
    }

    pub fn builder(client: Arc<dyn TimeSeriesClient>) -> InfluxSinkBuilder {
        InfluxSinkBuilder {
            client,
            config: SinkConfig::default(),
            values: Arc::new(MetadataValues),
            tags: Arc::new(MetadataTags),
        }
    }

    /// A cloneable handle to this sink. Handles stop working once the sink
    /// is dropped or shut down.
    pub fn handle(&self) -> SinkHandle {
        self.handle.clone()
    }

    pub fn log(&self, level: impl Into<String>, message: impl Into<String>, metadata: Value) -> LogAck {
        self.handle.log(level, message, metadata)
    }

    pub fn log_detached(&self, record: LogRecord) -> bool {
        self.handle.log_detached(record)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.handle.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    pub async fn ready(&self) -> Result<(), SinkError> {
        self.handle.ready().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.handle.stats()
    }

    /// Flush and stop, waiting for the worker to exit.
    pub async fn shutdown(mut self) -> Result<(), SinkError> {
        self.handle.shutdown().await?;
        if let Err(e) = (&mut self.worker).await {
            warn!(error = %e, "sink worker ended abnormally");
        }
        Ok(())
    }
}

impl Drop for InfluxSink {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

/// Builder for [`InfluxSink`], used to replace the extractors.
pub struct InfluxSinkBuilder {
    client: Arc<dyn TimeSeriesClient>,
    config: SinkConfig,
    values: Arc<dyn BuildValues>,
    tags: Arc<dyn BuildTags>,
}

impl InfluxSinkBuilder {
    pub fn config(mut self, config: SinkConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build_values(mut self, values: impl BuildValues + 'static) -> Self {
        self.values = Arc::new(values);
        self
    }

    pub fn build_tags(mut self, tags: impl BuildTags + 'static) -> Self {
        self.tags = Arc::new(tags);
        self
    }

    /// Validate the config and start the worker. Initialization of the
    /// database begins immediately in the background.
    pub fn spawn(self) -> Result<InfluxSink, ConfigError> {
        self.config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (ready_tx, ready_rx) = watch::channel(false);
        let stats = Arc::new(SinkStats::default());

        let name: Arc<str> = self.config.name.as_str().into();
        let init = tokio::spawn(initialize(Arc::clone(&self.client), self.config.database.clone()));

        let worker = Worker {
            flusher: FlushExecutor::new(
                Arc::clone(&name),
                self.client,
                self.config.measurement.as_str().into(),
                events.clone(),
                Arc::clone(&stats),
            ),
            name,
            database: self.config.database,
            silent: self.config.silent,
            values: self.values,
            tags: self.tags,
            gate: Gate::default(),
            batcher: Batcher::new(self.config.max_buffered_events),
            ready: ready_tx,
            events: events.clone(),
            stats: Arc::clone(&stats),
        };
        let worker = tokio::spawn(worker.run(rx, init, self.config.flush_interval));

        Ok(InfluxSink {
            handle: SinkHandle {
                tx,
                events,
                ready: ready_rx,
                stats,
            },
            worker,
        })
    }
}

/// Single owner of the buffer and the pending queue. Log calls, timer ticks
/// and initialization results are handled one at a time, so swapping the
/// buffer out never races with an append.
struct Worker {
    name: Arc<str>,
    database: String,
    silent: bool,
    values: Arc<dyn BuildValues>,
    tags: Arc<dyn BuildTags>,
    gate: Gate,
    batcher: Batcher,
    flusher: FlushExecutor,
    ready: watch::Sender<bool>,
    events: broadcast::Sender<SinkEvent>,
    stats: Arc<SinkStats>,
}

impl Worker {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Command>,
        mut init: JoinHandle<Result<InitOutcome, SinkError>>,
        flush_interval: Duration,
    ) {
        let mut timer = interval_at(Instant::now() + flush_interval, flush_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut init_done = false;

        loop {
            tokio::select! {
                res = &mut init, if !init_done => {
                    init_done = true;
                    let res = res.unwrap_or_else(|e| Err(SinkError::Initialization {
                        database: self.database.clone(),
                        source: Box::new(e),
                    }));
                    self.on_initialized(res).await;
                }
                cmd = rx.recv() => match cmd {
                    Some(Command::Log(call)) => self.on_log(call).await,
                    Some(Command::Shutdown(reply)) => {
                        init.abort();
                        self.shutdown(rx, vec![reply]).await;
                        return;
                    }
                    None => {
                        init.abort();
                        self.finish().await;
                        return;
                    }
                },
                _ = timer.tick(), if self.gate.is_ready() => {
                    let points = self.batcher.take();
                    self.flusher.spawn(points, FlushTrigger::Timer);
                }
                Some(res) = self.flusher.join_next(), if self.flusher.has_in_flight() => {
                    self.flusher.reap(res);
                }
            }
        }
    }

    async fn on_initialized(&mut self, res: Result<InitOutcome, SinkError>) {
        match res {
            Ok(outcome) => {
                let Some(queue) = self.gate.open() else {
                    return;
                };
                let created = outcome == InitOutcome::Created;
                info!(
                    sink = %self.name,
                    database = %self.database,
                    created,
                    replayed = queue.len(),
                    "sink ready"
                );
                for call in queue.into_replay() {
                    self.process(call).await;
                }
                self.ready.send_replace(true);
            }
            Err(e) => {
                // No retry: calls keep queueing until the process restarts.
                error!(sink = %self.name, error = %e, "sink initialization failed");
                let _ = self.events.send(SinkEvent::Error(Arc::new(e)));
            }
        }
    }

    async fn on_log(&mut self, call: LogCall) {
        if let Some(call) = self.gate.admit(call) {
            self.process(call).await;
        } else {
            debug!(sink = %self.name, pending = self.gate.pending(), "queued log call until ready");
        }
    }

    async fn process(&mut self, call: LogCall) {
        let result = self.accept(&call.record).await;
        call.respond(result);
    }

    async fn accept(&mut self, record: &LogRecord) -> Result<(), SinkError> {
        if self.silent {
            self.stats.record_silenced();
            return Ok(());
        }

        let (values, tags) = tokio::join!(self.values.build_values(record), self.tags.build_tags(record));
        let (values, tags) = match (values, tags) {
            (Ok(values), Ok(tags)) => (values, tags),
            (Err(e), _) | (_, Err(e)) => {
                self.stats.record_extraction_failure();
                warn!(sink = %self.name, level = %record.level, error = %e, "dropping log record");
                let _ = self
                    .events
                    .send(SinkEvent::Error(Arc::new(SinkError::Extraction(e.clone()))));
                return Err(SinkError::Extraction(e));
            }
        };

        let point = Point::stamped(values, tags, Utc::now());
        if let Some(batch) = self.batcher.push(point) {
            self.flusher.spawn(batch, FlushTrigger::Size);
        }

        self.stats.record_accepted();
        let _ = self.events.send(SinkEvent::Logged {
            level: record.level.clone(),
            message: record.message.clone(),
        });
        Ok(())
    }

    /// Handle the commands that were sent before the shutdown request, then
    /// stop.
    async fn shutdown(&mut self, mut rx: mpsc::UnboundedReceiver<Command>, mut replies: Vec<oneshot::Sender<()>>) {
        rx.close();
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Log(call) => self.on_log(call).await,
                Command::Shutdown(reply) => replies.push(reply),
            }
        }
        self.finish().await;
        for reply in replies {
            let _ = reply.send(());
        }
    }

    async fn finish(&mut self) {
        let pending = self.gate.take_pending();
        if !pending.is_empty() {
            warn!(sink = %self.name, pending = pending.len(), "sink stopped before it became ready");
        }
        for call in pending.into_replay() {
            call.respond(Err(SinkError::Closed));
        }

        if !self.batcher.is_empty() {
            let points = self.batcher.take();
            self.flusher.spawn(points, FlushTrigger::Shutdown);
        }
        self.flusher.drain().await;
        debug!(sink = %self.name, "sink stopped");
    }
}
