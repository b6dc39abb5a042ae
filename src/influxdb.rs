use crate::client::TimeSeriesClient;
use crate::config::{Credentials, HostConfig, SinkConfig};
use crate::error::BoxError;
use crate::line_protocol::encode_points;
use crate::record::Point;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

/// Errors from the InfluxDB HTTP client.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("InfluxDB responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("InfluxDB query failed: {0}")]
    Query(String),

    #[error("failed to decode InfluxDB response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{skipped} of {total} points had no fields and were not written")]
    NoFields { skipped: usize, total: usize },
}

/// InfluxDB 1.x implementation of [`TimeSeriesClient`] over HTTP.
///
/// Requests rotate over the configured hosts. A request that fails before
/// any response arrives is retried once on the next host.
pub struct InfluxClient {
    client: Client,
    hosts: Vec<HostConfig>,
    database: String,
    credentials: Option<Credentials>,
    next_host: AtomicUsize,
}

impl InfluxClient {
    /// Construct a client for the hosts, database and credentials of
    /// `config`.
    pub fn new(config: &SinkConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Same as [`InfluxClient::new`] with a preconfigured `reqwest` client
    /// (proxies, TLS roots, timeouts).
    pub fn with_client(client: Client, config: &SinkConfig) -> Self {
        Self {
            client,
            hosts: config.hosts.clone(),
            database: config.database.clone(),
            credentials: config.credentials.clone(),
            next_host: AtomicUsize::new(0),
        }
    }

    fn pick_host(&self) -> &HostConfig {
        let idx = self.next_host.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        &self.hosts[idx]
    }

    fn auth_query(&self) -> String {
        match &self.credentials {
            Some(c) => format!(
                "&u={}&p={}",
                urlencoding::encode(&c.username),
                urlencoding::encode(&c.password)
            ),
            None => String::new(),
        }
    }

    /// Send a request built by `build` for one host, moving to the next host
    /// once on a transport failure.
    async fn send<F>(&self, build: F) -> Result<Response, ClientError>
    where
        F: Fn(&Client, &HostConfig) -> RequestBuilder,
    {
        if self.hosts.is_empty() {
            return Err(ClientError::Query("no hosts configured".to_string()));
        }
        let attempts = if self.hosts.len() > 1 { 2 } else { 1 };
        let mut attempt = 1;
        loop {
            let host = self.pick_host();
            match build(&self.client, host).send().await {
                Ok(resp) => return check_status(resp).await,
                Err(e) if attempt < attempts => {
                    warn!(host = %host.base_url(), error = %e, "InfluxDB request failed, trying next host");
                    attempt += 1;
                }
                Err(e) => return Err(ClientError::Transport(e)),
            }
        }
    }

    async fn query(&self, q: &str, post: bool) -> Result<QueryResponse, ClientError> {
        let auth = self.auth_query();
        let resp = self
            .send(|client, host| {
                let url = format!("{}/query?q={}{}", host.base_url(), urlencoding::encode(q), auth);
                if post {
                    client.post(url)
                } else {
                    client.get(url)
                }
            })
            .await?;
        let text = resp.text().await?;
        let parsed: QueryResponse = serde_json::from_str(&text)?;
        if let Some(err) = parsed.error() {
            return Err(ClientError::Query(err));
        }
        Ok(parsed)
    }

    pub(crate) fn write_url(&self, host: &HostConfig) -> String {
        format!(
            "{}/write?db={}&precision=ns{}",
            host.base_url(),
            urlencoding::encode(&self.database),
            self.auth_query()
        )
    }
}

async fn check_status(resp: Response) -> Result<Response, ClientError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
    Err(ClientError::Status { status, body })
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<QueryResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

impl QueryResponse {
    fn error(&self) -> Option<String> {
        self.error
            .clone()
            .or_else(|| self.results.iter().find_map(|r| r.error.clone()))
    }

    /// First column of every row of the first series.
    fn first_column(&self) -> BTreeSet<String> {
        self.results
            .first()
            .and_then(|r| r.series.first())
            .map(|s| {
                s.values
                    .iter()
                    .filter_map(|row| row.first().and_then(|v| v.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

#[async_trait]
impl TimeSeriesClient for InfluxClient {
    async fn list_database_names(&self) -> Result<BTreeSet<String>, BoxError> {
        let resp = self.query("SHOW DATABASES", false).await?;
        Ok(resp.first_column())
    }

    async fn create_database(&self, name: &str) -> Result<(), BoxError> {
        self.query(&format!("CREATE DATABASE {}", quote_identifier(name)), true)
            .await?;
        Ok(())
    }

    async fn write_points(&self, measurement: &str, points: &[Point]) -> Result<(), BoxError> {
        if points.is_empty() {
            return Ok(());
        }
        let encoded = encode_points(measurement, points);
        if !encoded.body.is_empty() {
            let body = encoded.body;
            self.send(|client, host| client.post(self.write_url(host)).body(body.clone()))
                .await?;
        }
        // Lines that were encodable are already written; the rest must not
        // pass for a successful flush.
        if encoded.skipped > 0 {
            return Err(ClientError::NoFields {
                skipped: encoded.skipped,
                total: points.len(),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(hosts: Vec<HostConfig>, credentials: Option<Credentials>) -> SinkConfig {
        SinkConfig {
            hosts,
            credentials,
            database: "app logs".into(),
            ..SinkConfig::default()
        }
    }

    #[test]
    fn show_databases_response_is_decoded() {
        let raw = r#"{"results":[{"statement_id":0,"series":[{"name":"databases","columns":["name"],"values":[["_internal"],["log"]]}]}]}"#;
        let resp: QueryResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.error().is_none());
        let names = resp.first_column();
        assert!(names.contains("log"));
        assert!(names.contains("_internal"));
    }

    #[test]
    fn missing_series_means_no_databases() {
        let resp: QueryResponse = serde_json::from_str(r#"{"results":[{"statement_id":0}]}"#).unwrap();
        assert!(resp.first_column().is_empty());
    }

    #[test]
    fn statement_error_is_surfaced() {
        let raw = r#"{"results":[{"statement_id":0,"error":"database name required"}]}"#;
        let resp: QueryResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.error().as_deref(), Some("database name required"));
    }

    #[test]
    fn write_url_carries_database_and_credentials() {
        let client = InfluxClient::new(&config(
            vec![HostConfig::default()],
            Some(Credentials {
                username: "w r".into(),
                password: "p&ss".into(),
            }),
        ));
        assert_eq!(
            client.write_url(&HostConfig::default()),
            "http://localhost:8086/write?db=app%20logs&precision=ns&u=w%20r&p=p%26ss"
        );
    }

    #[test]
    fn hosts_rotate() {
        let client = InfluxClient::new(&config(
            vec![
                HostConfig::new("a", 8086, Protocol::Http),
                HostConfig::new("b", 8086, Protocol::Https),
            ],
            None,
        ));
        let picked: Vec<String> = (0..3).map(|_| client.pick_host().host.clone()).collect();
        assert_eq!(picked, vec!["a", "b", "a"]);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("log"), "\"log\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\\\"b\"");
    }

    fn unroutable() -> InfluxClient {
        // Any request to this host fails at the transport level.
        InfluxClient::new(&config(vec![HostConfig::new("invalid.", 1, Protocol::Http)], None))
    }

    fn stamped(values: serde_json::Value) -> Point {
        let values = values
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Point::stamped(values, Default::default(), chrono::Utc::now())
    }

    /// Accept one HTTP request, answer `204` and return its body.
    async fn capture_body(listener: TcpListener) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the body arrived");
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf).into_owned();
            let Some(split) = text.find("\r\n\r\n") else {
                continue;
            };
            let len = text[..split]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if text.len() >= split + 4 + len {
                stream
                    .write_all(b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n")
                    .await
                    .unwrap();
                return text[split + 4..split + 4 + len].to_string();
            }
        }
    }

    #[tokio::test]
    async fn empty_write_sends_nothing() {
        unroutable().write_points("log", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn batch_without_fields_is_an_error() {
        let points = vec![stamped(json!({})), stamped(json!({ "a": null })), stamped(json!({}))];

        let err = unroutable().write_points("log", &points).await.unwrap_err();
        let err = err.downcast::<ClientError>().unwrap();
        // Nothing was encodable, so no request was attempted.
        assert!(matches!(*err, ClientError::NoFields { skipped: 3, total: 3 }));
    }

    #[tokio::test]
    async fn mixed_batch_writes_fields_and_reports_the_rest() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(capture_body(listener));

        let client = InfluxClient::new(&config(vec![HostConfig::new("127.0.0.1", port, Protocol::Http)], None));
        let points = vec![stamped(json!({ "seq": 1 })), stamped(json!({}))];
        let err = client.write_points("log", &points).await.unwrap_err();
        let err = err.downcast::<ClientError>().unwrap();
        assert!(matches!(*err, ClientError::NoFields { skipped: 1, total: 2 }));

        let body = server.await.unwrap();
        assert_eq!(body.lines().count(), 1);
        assert!(body.starts_with("log seq=1i "));
    }
}
