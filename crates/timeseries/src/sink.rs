//! The boundary between the buffering writer and the backing time-series
//! store: something that accepts a rendered batch of line-protocol points.

use async_trait::async_trait;
use factoryops_core::TelemetryPoint;

use crate::config::TimeseriesConfig;
use crate::error::TimeseriesError;
use crate::line_protocol::render_batch;

/// Accepts batches of telemetry points for durable storage. A failed write
/// must be classified as [`TimeseriesError::Transient`] (retryable) or
/// [`TimeseriesError::Permanent`] (will not clear on retry) so the writer
/// knows whether to back off and retry or give up immediately.
#[async_trait]
pub trait TimeseriesSink: Send + Sync {
    /// Write one batch. Implementations should treat the batch as a single
    /// unit: InfluxDB's line-protocol write endpoint has no partial-success
    /// semantics within one request.
    async fn write_batch(&self, points: &[TelemetryPoint]) -> Result<(), TimeseriesError>;
}

/// An InfluxDB-compatible line-protocol HTTP sink, built on `reqwest` (the
/// same HTTP-client idiom used elsewhere in this workspace's ancestry for
/// webhook-style integrations, reused here for a different wire format).
pub struct HttpLineProtocolSink {
    client: reqwest::Client,
    config: TimeseriesConfig,
}

impl HttpLineProtocolSink {
    /// Build a sink from configuration, constructing a pooled `reqwest`
    /// client with the configured per-flush timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TimeseriesError::Permanent`] if the HTTP client could not
    /// be constructed (invalid TLS configuration, for example).
    pub fn new(config: TimeseriesConfig) -> Result<Self, TimeseriesError> {
        let client = reqwest::Client::builder()
            .timeout(config.flush_timeout)
            .build()
            .map_err(|e| TimeseriesError::Permanent(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn write_url(&self) -> String {
        format!(
            "{}/api/v2/write?org={}&bucket={}&precision=ns",
            self.config.url.trim_end_matches('/'),
            self.config.org,
            self.config.bucket
        )
    }
}

#[async_trait]
impl TimeseriesSink for HttpLineProtocolSink {
    async fn write_batch(&self, points: &[TelemetryPoint]) -> Result<(), TimeseriesError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = render_batch(points);
        let response = self
            .client
            .post(self.write_url())
            .header("Authorization", format!("Token {}", self.config.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| TimeseriesError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            Err(TimeseriesError::Permanent(format!("{status}: {body}")))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TimeseriesError::Transient(format!("{status}: {body}")))
        }
    }
}
