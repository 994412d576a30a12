//! Environment-sourced backend selection and process-level tuning for the
//! daemon binary. Each backend's own connection details still live in that
//! backend's `*Config::from_env()` (`PostgresConfig`, `RedisConfig`,
//! `PostgresQueueConfig`, `TimeseriesConfig`, `IngestConfig`); this module
//! only decides *which* backend to construct and the knobs that belong to
//! the binary rather than any one component.

use std::time::Duration;

/// Which [`factoryops_store::RelationalStore`] implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process, non-durable. The default, for local development.
    Memory,
    /// `factoryops_store::PostgresStore`.
    Postgres,
}

/// Which [`factoryops_state::SharedCache`] implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    /// In-process, single-node. The default, for local development.
    Memory,
    /// `factoryops_state_redis::RedisSharedCache`.
    Redis,
}

/// Which [`factoryops_queue::WorkQueue`] implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// In-process, non-durable. The default, for local development.
    Memory,
    /// `factoryops_queue_postgres::PostgresWorkQueue`.
    Postgres,
}

/// Backend selection plus the tuning knobs the daemon binary itself owns.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Relational store backend.
    pub store_backend: StoreBackend,
    /// Shared cache backend.
    pub cache_backend: CacheBackend,
    /// Work queue backend.
    pub queue_backend: QueueBackend,
    /// Number of concurrent alerting workers consuming the `rule_engine`
    /// queue. Defaults to that queue's concurrency cap.
    pub alerting_workers: usize,
    /// Bound applied to a `notifications` submit from the alerting worker.
    pub notification_dispatch_wait: Duration,
    /// How long a worker sleeps after finding its queue empty before
    /// polling again.
    pub queue_poll_interval: Duration,
    /// Grace period for draining in-flight work after a shutdown signal,
    /// before the process exits regardless.
    pub shutdown_grace: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            cache_backend: CacheBackend::Memory,
            queue_backend: QueueBackend::Memory,
            alerting_workers: factoryops_queue::QueueName::RuleEngine.max_concurrency(),
            notification_dispatch_wait: Duration::from_millis(500),
            queue_poll_interval: Duration::from_millis(200),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl DaemonConfig {
    /// Build from `FACTORYOPS_*` environment variables, falling back to
    /// [`Self::default`] for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_backend: match std::env::var("FACTORYOPS_STORE_BACKEND").as_deref() {
                Ok("postgres") => StoreBackend::Postgres,
                Ok("memory") => StoreBackend::Memory,
                _ => defaults.store_backend,
            },
            cache_backend: match std::env::var("FACTORYOPS_CACHE_BACKEND").as_deref() {
                Ok("redis") => CacheBackend::Redis,
                Ok("memory") => CacheBackend::Memory,
                _ => defaults.cache_backend,
            },
            queue_backend: match std::env::var("FACTORYOPS_QUEUE_BACKEND").as_deref() {
                Ok("postgres") => QueueBackend::Postgres,
                Ok("memory") => QueueBackend::Memory,
                _ => defaults.queue_backend,
            },
            alerting_workers: std::env::var("FACTORYOPS_ALERTING_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.alerting_workers),
            notification_dispatch_wait: std::env::var("FACTORYOPS_NOTIFICATION_DISPATCH_WAIT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.notification_dispatch_wait),
            queue_poll_interval: std::env::var("FACTORYOPS_QUEUE_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.queue_poll_interval),
            shutdown_grace: std::env::var("FACTORYOPS_SHUTDOWN_GRACE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_in_memory_backends() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.store_backend, StoreBackend::Memory);
        assert_eq!(cfg.cache_backend, CacheBackend::Memory);
        assert_eq!(cfg.queue_backend, QueueBackend::Memory);
        assert_eq!(cfg.alerting_workers, 4);
    }
}
