use crate::error::ConfigError;
use crate::record::LogRecord;
use crate::sink::{InfluxSink, SinkHandle};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events emitted by this crate are never forwarded, so that a failing
/// write which logs an error cannot feed itself.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");
const OWN_MODULES: &str = concat!(env!("CARGO_CRATE_NAME"), "::");

fn is_own_target(target: &str) -> bool {
    target == OWN_TARGET || target.starts_with(OWN_MODULES)
}

/// `tracing_subscriber` layer that turns events into log calls on an
/// [`InfluxSink`].
///
/// Events at or above the configured level become [`LogRecord`]s whose
/// metadata carries the event fields under `values` and the event target
/// under `tags`, which is the shape the default extractors expect. The
/// layer never waits: records are handed to the sink worker and processed
/// there.
pub struct InfluxLayer {
    sink: InfluxSink,
    max_level: LevelFilter,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Handed over to the sink.
    pub forwarded_events: Arc<AtomicU64>,
    /// Dropped because the sink had shut down.
    pub dropped_events: Arc<AtomicU64>,
}

impl InfluxLayer {
    /// Wrap `sink`, forwarding events at `level` and above.
    ///
    /// The layer keeps the sink (and so its worker) alive for as long as
    /// the subscriber exists.
    pub fn new(sink: InfluxSink, level: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            sink,
            max_level: parse_level(level)?,
            total_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
            dropped_events: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn handle(&self) -> SinkHandle {
        self.sink.handle()
    }
}

/// Map a level name onto a [`LevelFilter`]. Accepts the `tracing` names
/// and the npm-style `http`, `verbose` and `silly`.
pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "off" => Ok(LevelFilter::OFF),
        "error" => Ok(LevelFilter::ERROR),
        "warn" | "warning" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "http" | "verbose" | "debug" => Ok(LevelFilter::DEBUG),
        "silly" | "trace" => Ok(LevelFilter::TRACE),
        _ => Err(ConfigError::InvalidValue {
            key: "level".to_string(),
            value: level.to_string(),
        }),
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        _ => "trace",
    }
}

impl<S> Layer<S> for InfluxLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if *meta.level() > self.max_level || is_own_target(meta.target()) {
            return;
        }

        let mut fields = Map::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let message = message.unwrap_or_default();
        if !message.is_empty() {
            fields.insert("message".to_string(), Value::String(message.clone()));
        }

        let mut tags = Map::new();
        tags.insert("target".to_string(), Value::String(meta.target().to_string()));

        let mut metadata = Map::new();
        metadata.insert("values".to_string(), Value::Object(fields));
        metadata.insert("tags".to_string(), Value::Object(tags));

        let record = LogRecord::new(level_name(meta.level()), message, Value::Object(metadata));
        if self.sink.log_detached(record) {
            self.forwarded_events.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub struct FieldVisitor<'a> {
    pub fields: &'a mut Map<String, Value>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }
}
