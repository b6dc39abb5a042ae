use crate::client::TimeSeriesClient;
use crate::config::SinkConfig;
use crate::error::ConfigError;
use crate::layer::InfluxLayer;
use crate::sink::{InfluxSink, SinkHandle};
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the global subscriber installed by
/// [`init_tracing_with_config`].
///
/// **Fields**
/// - `sink`: buffering, batching and target settings of the sink.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   added next to [`InfluxLayer`] and events are also printed to the
///   console.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub sink: SinkConfig,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            sink: SinkConfig::default(),
            enable_stdout: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to install global subscriber: {0}")]
    SetGlobal(#[from] SetGlobalDefaultError),
}

/// Initialize the global `tracing` subscriber with an [`InfluxLayer`]
/// writing through `client`.
///
/// **Returns**
/// - A [`SinkHandle`] for subscribing to sink events and for a graceful
///   [`SinkHandle::shutdown`] before the process exits.
///
/// Must be called from within a Tokio runtime.
pub fn init_tracing_with_config(
    client: Arc<dyn TimeSeriesClient>,
    config: LayerConfig,
) -> Result<SinkHandle, InitError> {
    let level = config.sink.level.clone();
    let sink = InfluxSink::new(client, config.sink)?;
    let layer = InfluxLayer::new(sink, &level)?;
    let handle = layer.handle();

    // Both variants are spelled out since the subscriber types differ.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(handle)
}

/// Initialize tracing with [`LayerConfig::default`]: database and
/// measurement `log` on `localhost:8086`, flushed every 5s or every 50
/// events.
pub fn init_tracing(client: Arc<dyn TimeSeriesClient>) -> Result<SinkHandle, InitError> {
    init_tracing_with_config(client, LayerConfig::default())
}
