//! Environment variable names read by [`SinkConfig::from_env`].
//!
//! These are purely helpers; the sink itself never touches the
//! environment.
//!
//! [`SinkConfig::from_env`]: crate::config::SinkConfig::from_env

/// Comma-separated endpoints, e.g. `http://influx-a:8086,influx-b:8086`.
pub const INFLUX_SINK_HOSTS_ENV: &str = "INFLUX_SINK_HOSTS";

/// Target database name.
pub const INFLUX_SINK_DATABASE_ENV: &str = "INFLUX_SINK_DATABASE";

/// Target measurement name.
pub const INFLUX_SINK_MEASUREMENT_ENV: &str = "INFLUX_SINK_MEASUREMENT";

/// Optional user name. The password is only read when this is set.
pub const INFLUX_SINK_USERNAME_ENV: &str = "INFLUX_SINK_USERNAME";

/// Optional password.
pub const INFLUX_SINK_PASSWORD_ENV: &str = "INFLUX_SINK_PASSWORD";

/// Minimum level forwarded by the tracing layer.
pub const INFLUX_SINK_LEVEL_ENV: &str = "INFLUX_SINK_LEVEL";

/// Instance name used in the sink's own diagnostics.
pub const INFLUX_SINK_NAME_ENV: &str = "INFLUX_SINK_NAME";

/// Timer flush period in milliseconds.
pub const INFLUX_SINK_FLUSH_INTERVAL_MS_ENV: &str = "INFLUX_SINK_FLUSH_INTERVAL_MS";

/// Buffer length that forces a flush.
pub const INFLUX_SINK_MAX_BUFFERED_ENV: &str = "INFLUX_SINK_MAX_BUFFERED_EVENTS";

/// `true` to acknowledge log calls without writing anything.
pub const INFLUX_SINK_SILENT_ENV: &str = "INFLUX_SINK_SILENT";
