use crate::env;
use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Smallest accepted flush interval.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Default flush period of the timer trigger.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);

/// Default size trigger.
pub const DEFAULT_MAX_BUFFERED_EVENTS: usize = 50;

/// Transport used to reach an InfluxDB host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(ConfigError::InvalidValue {
                key: "protocol".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// One InfluxDB endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostConfig {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl HostConfig {
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
        }
    }

    /// Base URL without a trailing slash, e.g. `http://localhost:8086`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    /// Parse `host`, `host:port` or `scheme://host:port`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: "host".to_string(),
            value: s.to_string(),
        };

        let (protocol, rest) = match s.split_once("://") {
            Some((scheme, rest)) => (scheme.parse()?, rest),
            None => (Protocol::Http, s),
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (rest, 8086),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(HostConfig::new(host, port, protocol))
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig::new("localhost", 8086, Protocol::Http)
    }
}

/// Credentials passed through to the datastore unchanged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Sink configuration.
///
/// **Fields**
/// - `name`: instance name, attached to the sink's own diagnostics.
/// - `level`: minimum level forwarded by [`InfluxLayer`](crate::layer::InfluxLayer).
/// - `database`: database verified or created before the first write.
/// - `measurement`: measurement every batch is written into.
/// - `hosts`: endpoints of the datastore, used round-robin.
/// - `credentials`: optional username/password.
/// - `flush_interval`: period of the timer flush.
/// - `max_buffered_events`: buffer length that forces an inline flush.
/// - `silent`: acknowledge every log call without buffering anything.
#[derive(Clone, Debug)]
pub struct SinkConfig {
    pub name: String,
    pub level: String,
    pub database: String,
    pub measurement: String,
    pub hosts: Vec<HostConfig>,
    pub credentials: Option<Credentials>,
    pub flush_interval: Duration,
    pub max_buffered_events: usize,
    pub silent: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            name: "influxdb".to_string(),
            level: "info".to_string(),
            database: "log".to_string(),
            measurement: "log".to_string(),
            hosts: vec![HostConfig::default()],
            credentials: None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_buffered_events: DEFAULT_MAX_BUFFERED_EVENTS,
            silent: false,
        }
    }
}

impl SinkConfig {
    /// Build a config from `INFLUX_SINK_*` environment variables, falling
    /// back to the defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = SinkConfig::default();
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let hosts = match lookup(env::INFLUX_SINK_HOSTS_ENV) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(HostConfig::parse)
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.hosts.clone(),
        };

        let credentials = lookup(env::INFLUX_SINK_USERNAME_ENV).map(|username| Credentials {
            username,
            password: lookup(env::INFLUX_SINK_PASSWORD_ENV).unwrap_or_default(),
        });

        let flush_interval = match lookup(env::INFLUX_SINK_FLUSH_INTERVAL_MS_ENV) {
            Some(raw) => Duration::from_millis(parse_number(env::INFLUX_SINK_FLUSH_INTERVAL_MS_ENV, &raw)?),
            None => defaults.flush_interval,
        };

        let max_buffered_events = match lookup(env::INFLUX_SINK_MAX_BUFFERED_ENV) {
            Some(raw) => parse_number(env::INFLUX_SINK_MAX_BUFFERED_ENV, &raw)?,
            None => defaults.max_buffered_events,
        };

        let silent = match lookup(env::INFLUX_SINK_SILENT_ENV) {
            Some(raw) => parse_bool(env::INFLUX_SINK_SILENT_ENV, &raw)?,
            None => defaults.silent,
        };

        let config = SinkConfig {
            name: get(env::INFLUX_SINK_NAME_ENV, &defaults.name),
            level: get(env::INFLUX_SINK_LEVEL_ENV, &defaults.level),
            database: get(env::INFLUX_SINK_DATABASE_ENV, &defaults.database),
            measurement: get(env::INFLUX_SINK_MEASUREMENT_ENV, &defaults.measurement),
            hosts,
            credentials,
            flush_interval,
            max_buffered_events,
            silent,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the sink cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        if self.database.is_empty() {
            return Err(ConfigError::Empty("database"));
        }
        if self.measurement.is_empty() {
            return Err(ConfigError::Empty("measurement"));
        }
        if self.max_buffered_events == 0 {
            return Err(ConfigError::ZeroMaxBuffered);
        }
        if self.flush_interval < MIN_FLUSH_INTERVAL {
            return Err(ConfigError::FlushIntervalTooShort {
                min_ms: MIN_FLUSH_INTERVAL.as_millis() as u64,
            });
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SinkConfig::default();
        assert_eq!(cfg.name, "influxdb");
        assert_eq!(cfg.level, "info");
        assert_eq!(cfg.database, "log");
        assert_eq!(cfg.measurement, "log");
        assert_eq!(cfg.hosts, vec![HostConfig::new("localhost", 8086, Protocol::Http)]);
        assert!(cfg.credentials.is_none());
        assert_eq!(cfg.flush_interval, Duration::from_millis(5000));
        assert_eq!(cfg.max_buffered_events, 50);
        assert!(!cfg.silent);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn host_parsing() {
        assert_eq!(HostConfig::parse("db1").unwrap(), HostConfig::new("db1", 8086, Protocol::Http));
        assert_eq!(HostConfig::parse("db1:9000").unwrap(), HostConfig::new("db1", 9000, Protocol::Http));
        assert_eq!(
            HostConfig::parse("https://db1:443/").unwrap(),
            HostConfig::new("db1", 443, Protocol::Https)
        );
        assert!(HostConfig::parse("ftp://db1").is_err());
        assert!(HostConfig::parse("db1:notaport").is_err());
        assert!(HostConfig::parse(":8086").is_err());
    }

    #[test]
    fn base_url_includes_scheme_and_port() {
        assert_eq!(HostConfig::default().base_url(), "http://localhost:8086");
    }

    #[test]
    fn from_env_overrides() {
        let cfg = SinkConfig::from_lookup(lookup(&[
            (env::INFLUX_SINK_HOSTS_ENV, "a:1, https://b:2"),
            (env::INFLUX_SINK_DATABASE_ENV, "app"),
            (env::INFLUX_SINK_USERNAME_ENV, "writer"),
            (env::INFLUX_SINK_PASSWORD_ENV, "secret"),
            (env::INFLUX_SINK_FLUSH_INTERVAL_MS_ENV, "250"),
            (env::INFLUX_SINK_MAX_BUFFERED_ENV, "7"),
            (env::INFLUX_SINK_SILENT_ENV, "yes"),
        ]))
        .unwrap();

        assert_eq!(cfg.hosts.len(), 2);
        assert_eq!(cfg.hosts[1].protocol, Protocol::Https);
        assert_eq!(cfg.database, "app");
        assert_eq!(cfg.measurement, "log");
        let creds = cfg.credentials.unwrap();
        assert_eq!(creds.username, "writer");
        assert_eq!(creds.password, "secret");
        assert_eq!(cfg.flush_interval, Duration::from_millis(250));
        assert_eq!(cfg.max_buffered_events, 7);
        assert!(cfg.silent);
    }

    #[test]
    fn from_env_rejects_bad_values() {
        let err = SinkConfig::from_lookup(lookup(&[(env::INFLUX_SINK_MAX_BUFFERED_ENV, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = SinkConfig::from_lookup(lookup(&[(env::INFLUX_SINK_MAX_BUFFERED_ENV, "0")])).unwrap_err();
        assert_eq!(err, ConfigError::ZeroMaxBuffered);

        let err = SinkConfig::from_lookup(lookup(&[(env::INFLUX_SINK_FLUSH_INTERVAL_MS_ENV, "1")])).unwrap_err();
        assert_eq!(err, ConfigError::FlushIntervalTooShort { min_ms: 10 });
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            username: "u".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
