//! Environment-sourced configuration for the time-series writer.

use std::time::Duration;

/// Configuration for [`crate::writer::TimeSeriesWriter`] and its HTTP sink.
#[derive(Debug, Clone)]
pub struct TimeseriesConfig {
    /// Base URL of the InfluxDB-compatible write endpoint, e.g.
    /// `http://localhost:8086`.
    pub url: String,
    /// Auth token sent as `Authorization: Token <token>`.
    pub token: String,
    /// Target bucket (InfluxDB 2.x) or database name.
    pub bucket: String,
    /// Organization (InfluxDB 2.x).
    pub org: String,
    /// Flush the buffer once it holds this many points.
    pub batch_size: usize,
    /// Flush the buffer after this much time has elapsed, regardless of size.
    pub flush_interval: Duration,
    /// Retries attempted on flush failure before spilling to the overflow
    /// buffer.
    pub max_retries: u32,
    /// Base delay for the flush retry backoff.
    pub backoff_base: Duration,
    /// Cap on the flush retry backoff.
    pub backoff_max: Duration,
    /// Maximum number of points the on-disk overflow buffer will hold
    /// before the oldest unflushed samples are shed.
    pub overflow_capacity: usize,
    /// Directory the overflow buffer is persisted under.
    pub overflow_dir: String,
    /// Deadline applied to each flush HTTP call.
    pub flush_timeout: Duration,
}

impl Default for TimeseriesConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost:8086"),
            token: String::new(),
            bucket: String::from("factoryops"),
            org: String::from("factoryops"),
            batch_size: 500,
            flush_interval: Duration::from_secs(1),
            max_retries: 5,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(30),
            overflow_capacity: 50_000,
            overflow_dir: String::from("./factoryops-overflow"),
            flush_timeout: Duration::from_secs(10),
        }
    }
}

impl TimeseriesConfig {
    /// Build from `FACTORYOPS_TIMESERIES_*` environment variables, falling
    /// back to [`Self::default`] for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("FACTORYOPS_TIMESERIES_URL").unwrap_or(defaults.url),
            token: std::env::var("FACTORYOPS_TIMESERIES_TOKEN").unwrap_or(defaults.token),
            bucket: std::env::var("FACTORYOPS_TIMESERIES_BUCKET").unwrap_or(defaults.bucket),
            org: std::env::var("FACTORYOPS_TIMESERIES_ORG").unwrap_or(defaults.org),
            batch_size: env_usize("FACTORYOPS_TIMESERIES_BATCH_SIZE", defaults.batch_size),
            flush_interval: env_duration_ms(
                "FACTORYOPS_TIMESERIES_FLUSH_INTERVAL_MS",
                defaults.flush_interval,
            ),
            max_retries: env_u32("FACTORYOPS_TIMESERIES_MAX_RETRIES", defaults.max_retries),
            overflow_capacity: env_usize(
                "FACTORYOPS_TIMESERIES_OVERFLOW_CAPACITY",
                defaults.overflow_capacity,
            ),
            overflow_dir: std::env::var("FACTORYOPS_TIMESERIES_OVERFLOW_DIR")
                .unwrap_or(defaults.overflow_dir),
            ..defaults
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = TimeseriesConfig::default();
        assert_eq!(cfg.batch_size, 500);
        assert_eq!(cfg.flush_interval, Duration::from_secs(1));
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.backoff_base, Duration::from_millis(250));
        assert_eq!(cfg.backoff_max, Duration::from_secs(30));
    }
}
