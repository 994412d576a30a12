//! Environment-sourced configuration for the ingestion coordinator.

use std::time::Duration;

/// Configuration for [`crate::coordinator::IngestionCoordinator`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// MQTT broker host.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// Client id presented to the broker.
    pub client_id: String,
    /// Worker pool size; messages are partitioned across workers by
    /// `hash(factory_slug, device_key) mod worker_count`. Default: CPU cores
    /// times two.
    pub worker_count: usize,
    /// Bounded channel capacity per worker.
    pub worker_queue_capacity: usize,
    /// Deadline for relational-store calls within one work unit.
    pub relational_deadline: Duration,
    /// Deadline for shared-cache calls.
    pub cache_deadline: Duration,
    /// Deadline for a time-series flush.
    pub timeseries_deadline: Duration,
    /// Bound on blocking the consume loop when `rule_engine` is saturated,
    /// per §4.4 step 8.
    pub rule_dispatch_wait: Duration,
    /// Debounce window for coalesced `last_seen` writes.
    pub last_seen_debounce: Duration,
    /// Redelivery attempts before a message is moved to the local
    /// dead-letter file.
    pub max_message_retries: u32,
    /// Path to the local dead-letter file for messages that exhaust
    /// retries.
    pub dead_letter_path: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            broker_host: String::from("localhost"),
            broker_port: 1883,
            client_id: String::from("factoryops-ingest"),
            worker_count: default_worker_count(),
            worker_queue_capacity: 1024,
            relational_deadline: Duration::from_secs(5),
            cache_deadline: Duration::from_secs(2),
            timeseries_deadline: Duration::from_secs(10),
            rule_dispatch_wait: Duration::from_millis(500),
            last_seen_debounce: Duration::from_secs(5),
            max_message_retries: 5,
            dead_letter_path: String::from("./factoryops-dead-letters/ingest.ndjson"),
        }
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(4) * 2
}

impl IngestConfig {
    /// Build from `FACTORYOPS_INGEST_*` and `FACTORYOPS_MQTT_*` environment
    /// variables, falling back to [`Self::default`] for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            broker_host: std::env::var("FACTORYOPS_MQTT_HOST").unwrap_or(defaults.broker_host),
            broker_port: std::env::var("FACTORYOPS_MQTT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.broker_port),
            client_id: std::env::var("FACTORYOPS_MQTT_CLIENT_ID").unwrap_or(defaults.client_id),
            worker_count: std::env::var("FACTORYOPS_INGEST_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.worker_count),
            last_seen_debounce: std::env::var("FACTORYOPS_LAST_SEEN_DEBOUNCE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.last_seen_debounce),
            dead_letter_path: std::env::var("FACTORYOPS_INGEST_DEAD_LETTER_PATH")
                .unwrap_or(defaults.dead_letter_path),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = IngestConfig::default();
        assert_eq!(cfg.last_seen_debounce, Duration::from_secs(5));
        assert_eq!(cfg.max_message_retries, 5);
        assert!(cfg.worker_count >= 2);
    }
}
